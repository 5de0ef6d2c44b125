use std::{fs::create_dir_all, path::PathBuf, time::Instant};

use anyhow::Context;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use ocular_psf::{generate_psf_with, Calibration, Psf, Wavefront};
use rayon::prelude::*;
use serde::Serialize;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "psf-sweep", about = "Ocular PSF metrics over a range of defocus")]
struct Opt {
    /// First defocus [D]
    #[structopt(long, default_value = "-4", allow_hyphen_values = true)]
    from: f64,
    /// Last defocus [D]
    #[structopt(long, default_value = "4", allow_hyphen_values = true)]
    to: f64,
    /// Defocus step [D]
    #[structopt(long, default_value = "0.25")]
    step: f64,
    /// Pupil diameter [mm]
    #[structopt(long, default_value = "3")]
    pupil_mm: f64,
    /// Wavelength [nm]
    #[structopt(long, default_value = "550")]
    wavelength_nm: f64,
    /// Astigmatism magnitude [m]
    #[structopt(long, default_value = "0")]
    astig_mag_m: f64,
    /// Astigmatism axis [deg]
    #[structopt(long, default_value = "0", allow_hyphen_values = true)]
    astig_axis_deg: f64,
    /// PSF resolution [px]
    #[structopt(long, default_value = "128")]
    resolution: usize,
    /// Pupil sampling factor
    #[structopt(long, default_value = "2")]
    oversample: usize,
    /// CSV table of the PSF metrics
    #[structopt(short, long, default_value = "psf_sweep.csv", parse(from_os_str))]
    output: PathBuf,
    /// Directory where the PSFs are saved as PNG frames
    #[structopt(long, parse(from_os_str))]
    frames: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Record {
    defocus_diopters: f64,
    psf_sum: f64,
    psf_peak: f64,
    /// spread about the centroid [px²]
    second_moment_px2: f64,
    centroid_row: f64,
    centroid_col: f64,
}
impl From<(f64, &Psf)> for Record {
    fn from((defocus_diopters, psf): (f64, &Psf)) -> Self {
        let (centroid_row, centroid_col) = psf.centroid();
        Self {
            defocus_diopters,
            psf_sum: psf.sum(),
            psf_peak: psf.peak(),
            second_moment_px2: psf.second_moment(),
            centroid_row,
            centroid_col,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();
    anyhow::ensure!(
        opt.step > 0f64 && opt.to >= opt.from,
        "invalid defocus range: {} to {} by {}",
        opt.from,
        opt.to,
        opt.step
    );

    let n = ((opt.to - opt.from) / opt.step + 1e-9).floor() as usize + 1;
    let defocus: Vec<f64> = (0..n).map(|i| opt.from + i as f64 * opt.step).collect();
    println!("Sweeping {} defocus values", n);

    if let Some(dir) = &opt.frames {
        create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let calibration = Calibration::default();
    let pb = ProgressBar::new(n as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message("Computing PSFs");

    let now = Instant::now();
    let records = defocus
        .par_iter()
        .enumerate()
        .progress_with(pb)
        .map(|(i, &d)| {
            let psf = generate_psf_with(
                &Wavefront::new(d).astigmatism(opt.astig_mag_m, opt.astig_axis_deg),
                opt.pupil_mm,
                opt.wavelength_nm,
                opt.resolution,
                opt.oversample,
                &calibration,
            )?;
            if let Some(dir) = &opt.frames {
                psf.save(dir.join(format!("frame_{:06}.png", i)))?;
            }
            Ok(Record::from((d, &psf)))
        })
        .collect::<anyhow::Result<Vec<Record>>>()?;
    log::info!("{} PSFs computed in {}s", n, now.elapsed().as_secs());

    let mut wtr = csv::Writer::from_path(&opt.output)
        .with_context(|| format!("failed to create {}", opt.output.display()))?;
    for record in &records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    println!("PSF metrics written to {}", opt.output.display());

    Ok(())
}
