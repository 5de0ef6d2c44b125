use std::{fs, path::PathBuf};

use anyhow::Context;
use chrono::Utc;
use ocular_psf::{
    output_file_name, simulate_with, to_data_url, BlurModel, ChromaticMode, OpticalParameters,
    SimulationConfig,
};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "ocular-psf",
    about = "Simulates the defocus, astigmatism and chromatic blur of the eye on an image"
)]
struct Opt {
    /// Input image
    #[structopt(parse(from_os_str))]
    image: PathBuf,
    /// Defocus [D], negative for myopia
    #[structopt(long, default_value = "-2", allow_hyphen_values = true)]
    diopters: f64,
    /// Pupil diameter [mm]
    #[structopt(long, default_value = "3")]
    pupil_mm: f64,
    /// Wavelength [nm]
    #[structopt(long, default_value = "550")]
    wavelength_nm: f64,
    /// Red, green and blue channels at their own wavelength
    #[structopt(long)]
    trichromatic: bool,
    /// Astigmatism magnitude [m]
    #[structopt(long, default_value = "0")]
    astig_mag_m: f64,
    /// Astigmatism axis [deg]
    #[structopt(long, default_value = "0", allow_hyphen_values = true)]
    astig_axis_deg: f64,
    #[structopt(long, default_value = "1")]
    contrast: f64,
    #[structopt(long, default_value = "1")]
    gamma: f64,
    /// JSON simulation configuration, overridden by the options below
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,
    /// Blur model: fraunhofer or gaussian
    #[structopt(long, parse(try_from_str = BlurModel::parse))]
    model: Option<BlurModel>,
    /// Chromatic mode: achromatic or chromatic_rgb
    #[structopt(long, parse(try_from_str = ChromaticMode::parse))]
    chromatic: Option<ChromaticMode>,
    /// PSF resolution [px]
    #[structopt(long)]
    resolution: Option<usize>,
    /// Pupil sampling factor
    #[structopt(long)]
    oversample: Option<usize>,
    /// Screen pixel density [px/mm]
    #[structopt(long)]
    px_per_mm: Option<f64>,
    /// Eye to screen distance [m]
    #[structopt(long)]
    viewing_distance_m: Option<f64>,
    /// Output directory, the image is written in its `simulations` folder
    #[structopt(short, long, default_value = ".", parse(from_os_str))]
    output_dir: PathBuf,
    /// Writes the metrics to a JSON file instead of the standard output
    #[structopt(long, parse(from_os_str))]
    metrics: Option<PathBuf>,
    /// Saves the reference PSF as a PNG image
    #[structopt(long, parse(from_os_str))]
    psf_png: Option<PathBuf>,
    /// Saves the reference PSF as a numpy array
    #[structopt(long, parse(from_os_str))]
    psf_npy: Option<PathBuf>,
    /// Prints the simulated image as a PNG data URL
    #[structopt(long)]
    data_url: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let mut config = match &opt.config {
        Some(path) => {
            let file = fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            serde_json::from_reader(file)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => SimulationConfig::default(),
    };
    if let Some(arg) = opt.model {
        config = config.blur_model(arg);
    }
    if let Some(arg) = opt.chromatic {
        config = config.chromatic_mode(arg);
    }
    config = config.sampling(
        opt.resolution.unwrap_or(config.resolution),
        opt.oversample.unwrap_or(config.oversample),
    );
    config = config.screen(
        opt.px_per_mm.unwrap_or(config.screen.px_per_mm),
        opt.viewing_distance_m
            .unwrap_or(config.screen.viewing_distance_m),
    );

    let params = OpticalParameters::default()
        .defocus(opt.diopters)
        .pupil(opt.pupil_mm)
        .wavelength(if opt.trichromatic {
            None
        } else {
            Some(opt.wavelength_nm)
        })
        .astigmatism(opt.astig_mag_m, opt.astig_axis_deg)
        .contrast_gamma(opt.contrast, opt.gamma);

    let image = image::open(&opt.image)
        .with_context(|| format!("failed to read {}", opt.image.display()))?
        .to_rgba8();
    log::info!(
        "{}: {}x{}",
        opt.image.display(),
        image.width(),
        image.height()
    );

    let result = simulate_with(&image, &params, &config)?;

    let dir = opt.output_dir.join("simulations");
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(output_file_name(params.defocus_diopters, &Utc::now()));
    result
        .output_image
        .save(&path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    println!("Simulated image saved to {}", path.display());

    if opt.psf_png.is_some() || opt.psf_npy.is_some() {
        match &result.reference_psf {
            Some(psf) => {
                if let Some(path) = &opt.psf_png {
                    psf.save(path)?;
                    log::info!("PSF saved to {}", path.display());
                }
                if let Some(path) = &opt.psf_npy {
                    psf.to_npy(path)?;
                    log::info!("PSF saved to {}", path.display());
                }
            }
            None => log::warn!("PSF export is only available for the fraunhofer blur model"),
        }
    }

    let metrics = serde_json::to_string_pretty(&result.metrics)?;
    match &opt.metrics {
        Some(path) => fs::write(path, metrics)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{}", metrics),
    }

    if opt.data_url {
        println!("{}", to_data_url(&result.output_image)?);
    }

    Ok(())
}
