//! # Ocular PSF
//!
//! Simulation of the blur of the human eye: the point spread function of a
//! circular pupil with defocus and astigmatism is computed by Fraunhofer
//! diffraction, optionally per color channel to render the longitudinal
//! chromatic aberration, and convolved with an sRGB image in linear light.
//! A contrast and gamma remapping is applied to the blurred image.
//!
//! ```no_run
//! use ocular_psf::{simulate, OpticalParameters};
//!
//! let image = image::open("chart.png")?.to_rgba8();
//! let params = OpticalParameters::default().defocus(-1.5).pupil(4.0);
//! let result = simulate(&image, &params)?;
//! result.output_image.save("chart_blurred.png")?;
//! println!("{}", serde_json::to_string_pretty(&result.metrics)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{fmt::Display, io::Cursor, time::Instant};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, TimeZone};
use image::{ImageFormat, RgbaImage};
use ndarray::Array2;
use serde::Serialize;

pub mod chromatic;
pub mod convolve;
pub mod error;
mod fft;
pub mod model;
pub mod params;
pub mod psf;
pub mod pupil;
pub mod shaping;
pub mod srgb;
pub mod wavefront;

pub use chromatic::{Channel, Screen};
pub use convolve::{convolve_in_linear_light, ChannelKernels};
pub use error::{Error, ErrorKind, Result};
pub use model::{build_kernels, BlurModel, ChromaticMode, KernelInfo, SimulationConfig};
pub use params::{Calibration, OpticalParameters};
pub use psf::{generate_psf, generate_psf_with, Psf};
pub use shaping::apply_contrast_gamma;
pub use wavefront::Wavefront;

/// Summary of a simulation
#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    /// energy of the reference kernel
    pub psf_sum: f64,
    /// peak of the reference kernel
    pub psf_peak: f64,
    #[serde(flatten)]
    pub parameters: OpticalParameters,
    pub blur_model: BlurModel,
    pub chromatic_mode: ChromaticMode,
    pub kernels: Vec<KernelInfo>,
    /// PSF pupil pixel scale [m]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_scale_m: Option<f64>,
    /// simulation duration [s]
    pub elapsed_s: f64,
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub kernels: ChannelKernels,
    /// PSF of the reference kernel, Fraunhofer model only
    pub reference_psf: Option<Psf>,
    pub output_image: RgbaImage,
    pub metrics: Metrics,
}
impl SimulationResult {
    /// The shared kernel, or the green channel kernel if the channels have their own
    pub fn psf(&self) -> &Array2<f64> {
        self.kernels.reference()
    }
}

/// Simulates the eye described by `params` looking at `image`, with the default [SimulationConfig]
pub fn simulate(image: &RgbaImage, params: &OpticalParameters) -> Result<SimulationResult> {
    simulate_with(image, params, &SimulationConfig::default())
}

/// Blurs `image` with the kernels of the eye described by `params` and applies the contrast and gamma remapping
pub fn simulate_with(
    image: &RgbaImage,
    params: &OpticalParameters,
    config: &SimulationConfig,
) -> Result<SimulationResult> {
    let now = Instant::now();
    params.validate()?;
    config.validate()?;

    let model_kernels = build_kernels(params, config)?;
    let pixel_scale_m = model_kernels.pixel_scale_m();
    let model::Kernels { kernels, info, psf } = model_kernels;
    log::info!(
        "{} kernels ({}) computed in {}ms",
        config.blur_model,
        config.chromatic_mode,
        now.elapsed().as_millis()
    );

    let blurred = convolve_in_linear_light(image, &kernels)?;
    let output_image = apply_contrast_gamma(&blurred, params.contrast, params.gamma);

    let reference = kernels.reference();
    let metrics = Metrics {
        psf_sum: reference.sum(),
        psf_peak: reference.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        parameters: *params,
        blur_model: config.blur_model,
        chromatic_mode: config.chromatic_mode,
        kernels: info,
        pixel_scale_m,
        elapsed_s: now.elapsed().as_secs_f64(),
    };
    log::info!(
        "{}x{} image simulated in {:.3}s",
        image.width(),
        image.height(),
        metrics.elapsed_s
    );
    Ok(SimulationResult {
        kernels,
        reference_psf: psf,
        output_image,
        metrics,
    })
}

/// File name of a simulated image: `psf_sim_D<defocus>_<YYYYmmdd_HHMMSS>.png`
///
/// The decimal point of the defocus is replaced by an underscore.
pub fn output_file_name<Tz: TimeZone>(defocus_diopters: f64, timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    format!(
        "psf_sim_D{}_{}.png",
        format!("{:?}", defocus_diopters).replace('.', "_"),
        timestamp.format("%Y%m%d_%H%M%S")
    )
}

/// Encodes the image into a PNG data URL
pub fn to_data_url(image: &RgbaImage) -> Result<String> {
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}
