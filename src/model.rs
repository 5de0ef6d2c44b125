//! Blur models and simulation configuration
//!
//! A [BlurModel] turns the optical parameters into the convolution kernels of
//! the color channels, either from the Fraunhofer PSF of the pupil or from a
//! Gaussian approximation of the defocus blur circle. The [ChromaticMode] and
//! the wavelength decide whether a single kernel is shared by the channels.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    chromatic::{
        effective_defocus, gaussian_kernel, gaussian_kernel_size, gaussian_sigma_px, Channel,
        Screen,
    },
    convolve::ChannelKernels,
    error::{ErrorKind, Result},
    params::{Calibration, OpticalParameters, REFERENCE_WAVELENGTH_NM},
    psf::{generate_psf_with, Psf},
    wavefront::Wavefront,
};

/// Largest kernel side [px]
pub const MAX_KERNEL_SIZE: usize = 4097;
/// Largest pupil grid side, PSF resolution times oversampling [px]
pub const MAX_PUPIL_SAMPLES: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("invalid {0}: {1}")]
    InvalidParameter(&'static str, f64),
    #[error("unsupported mode: {0:?}")]
    UnsupportedMode(String),
    #[error("{0}px kernel exceeds the {MAX_KERNEL_SIZE}px limit")]
    KernelTooLarge(usize),
    #[error("{0}px pupil grid exceeds the {MAX_PUPIL_SAMPLES}px limit")]
    PupilTooLarge(usize),
}
impl ModelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::InvalidParameter(..)
            | ModelError::KernelTooLarge(_)
            | ModelError::PupilTooLarge(_) => ErrorKind::InvalidParameter,
            ModelError::UnsupportedMode(_) => ErrorKind::UnsupportedMode,
        }
    }
}

/// Source of the blur kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, EnumIter, Display, Serialize, Deserialize)]
pub enum BlurModel {
    /// Diffraction PSF of the aberrated pupil
    #[default]
    #[strum(serialize = "fraunhofer")]
    #[serde(rename = "fraunhofer")]
    FraunhoferPsf,
    /// Gaussian approximation of the geometric blur circle, ignores astigmatism
    #[strum(serialize = "gaussian")]
    #[serde(rename = "gaussian")]
    HeuristicGaussian,
}
impl BlurModel {
    pub fn parse(name: &str) -> std::result::Result<Self, ModelError> {
        name.parse()
            .map_err(|_| ModelError::UnsupportedMode(name.to_string()))
    }
    /// Computes the kernel for the given effective defocus and wavelength,
    /// with the PSF it is made of for the Fraunhofer model
    ///
    /// The kernel size is checked against [MAX_KERNEL_SIZE] before anything is allocated.
    pub fn kernel(
        &self,
        defocus_diopters: f64,
        wavelength_nm: f64,
        params: &OpticalParameters,
        config: &SimulationConfig,
    ) -> Result<(Array2<f64>, Option<Psf>)> {
        match self {
            BlurModel::FraunhoferPsf => {
                config.check_sampling()?;
                let wavefront = Wavefront::new(defocus_diopters)
                    .astigmatism(params.astigmatism_magnitude_m, params.astigmatism_axis_deg);
                let psf = generate_psf_with(
                    &wavefront,
                    params.pupil_diameter_mm,
                    wavelength_nm,
                    config.resolution,
                    config.oversample,
                    &config.calibration,
                )?;
                Ok((psf.data().clone(), Some(psf)))
            }
            BlurModel::HeuristicGaussian => {
                let sigma =
                    gaussian_sigma_px(defocus_diopters, params.pupil_diameter_mm, &config.screen);
                log::debug!("Gaussian blur: D={:.3}, sigma={:.3}px", defocus_diopters, sigma);
                let size = gaussian_kernel_size(sigma);
                if !(size <= MAX_KERNEL_SIZE as f64) {
                    return Err(ModelError::KernelTooLarge(size as usize).into());
                }
                Ok((gaussian_kernel(sigma), None))
            }
        }
    }
}

/// Chromatic treatment of the color channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, EnumIter, Display, Serialize, Deserialize)]
pub enum ChromaticMode {
    /// one kernel at the simulation wavelength for all the channels
    #[default]
    #[strum(serialize = "achromatic")]
    #[serde(rename = "achromatic")]
    Achromatic,
    /// one kernel per channel, at its wavelength and chromatically shifted defocus
    #[strum(serialize = "chromatic_rgb")]
    #[serde(rename = "chromatic_rgb")]
    ChromaticRgb,
}
impl ChromaticMode {
    pub fn parse(name: &str) -> std::result::Result<Self, ModelError> {
        name.parse()
            .map_err(|_| ModelError::UnsupportedMode(name.to_string()))
    }
}

/// Simulation settings independent of the eye
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub blur_model: BlurModel,
    pub chromatic_mode: ChromaticMode,
    /// PSF size [px]
    pub resolution: usize,
    /// pupil sampling factor
    pub oversample: usize,
    pub screen: Screen,
    pub calibration: Calibration,
}
impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            blur_model: BlurModel::default(),
            chromatic_mode: ChromaticMode::default(),
            resolution: 256,
            oversample: 2,
            screen: Screen::default(),
            calibration: Calibration::default(),
        }
    }
}
impl SimulationConfig {
    pub fn blur_model(mut self, blur_model: BlurModel) -> Self {
        self.blur_model = blur_model;
        self
    }
    pub fn chromatic_mode(mut self, chromatic_mode: ChromaticMode) -> Self {
        self.chromatic_mode = chromatic_mode;
        self
    }
    /// Sets the PSF size and the pupil oversampling factor
    pub fn sampling(mut self, resolution: usize, oversample: usize) -> Self {
        self.resolution = resolution;
        self.oversample = oversample;
        self
    }
    pub fn screen(mut self, px_per_mm: f64, viewing_distance_m: f64) -> Self {
        self.screen = Screen {
            px_per_mm,
            viewing_distance_m,
        };
        self
    }
    pub fn calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }
    /// Checks the PSF resolution and the pupil grid size against their limits
    pub fn check_sampling(&self) -> std::result::Result<(), ModelError> {
        if self.resolution > MAX_KERNEL_SIZE {
            return Err(ModelError::KernelTooLarge(self.resolution));
        }
        let samples = self.resolution.saturating_mul(self.oversample);
        if samples > MAX_PUPIL_SAMPLES {
            return Err(ModelError::PupilTooLarge(samples));
        }
        Ok(())
    }
    pub fn validate(&self) -> std::result::Result<(), ModelError> {
        self.calibration.validate()?;
        self.check_sampling()?;
        let Screen {
            px_per_mm,
            viewing_distance_m,
        } = self.screen;
        if !(px_per_mm.is_finite() && px_per_mm > 0f64) {
            return Err(ModelError::InvalidParameter("px_per_mm", px_per_mm));
        }
        if !(viewing_distance_m.is_finite() && viewing_distance_m > 0f64) {
            return Err(ModelError::InvalidParameter(
                "viewing_distance_m",
                viewing_distance_m,
            ));
        }
        Ok(())
    }
    /// Whether the color channels get their own kernels
    pub fn is_per_channel(&self, params: &OpticalParameters) -> bool {
        self.chromatic_mode == ChromaticMode::ChromaticRgb || params.wavelength_nm.is_none()
    }
}

/// Description of a convolution kernel
#[derive(Debug, Clone, Serialize)]
pub struct KernelInfo {
    /// the channel the kernel applies to, `None` if shared by all channels
    pub channel: Option<Channel>,
    pub wavelength_nm: f64,
    pub effective_defocus_diopters: f64,
    pub peak: f64,
    pub size: usize,
}

/// The kernels of a simulation
#[derive(Debug, Clone)]
pub struct Kernels {
    pub kernels: ChannelKernels,
    pub info: Vec<KernelInfo>,
    /// PSF of the reference kernel, Fraunhofer model only
    pub psf: Option<Psf>,
}
impl Kernels {
    /// PSF pupil pixel scale [m], Fraunhofer model only
    pub fn pixel_scale_m(&self) -> Option<f64> {
        self.psf.as_ref().map(|psf| psf.pixel_scale_m)
    }
}

fn peak(kernel: &Array2<f64>) -> f64 {
    kernel.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
}

fn channel_kernel(
    channel: Option<Channel>,
    defocus_diopters: f64,
    wavelength_nm: f64,
    params: &OpticalParameters,
    config: &SimulationConfig,
) -> Result<(Array2<f64>, Option<Psf>, KernelInfo)> {
    let (kernel, psf) = config
        .blur_model
        .kernel(defocus_diopters, wavelength_nm, params, config)?;
    let info = KernelInfo {
        channel,
        wavelength_nm,
        effective_defocus_diopters: defocus_diopters,
        peak: peak(&kernel),
        size: kernel.nrows(),
    };
    Ok((kernel, psf, info))
}

/// Builds the blur kernels of the color channels
///
/// The channels get their own kernels, at their wavelengths and with their
/// chromatically shifted defocus, in [ChromaticMode::ChromaticRgb] or if the
/// wavelength is unspecified. Otherwise a single kernel is computed at the
/// given wavelength with the unshifted defocus.
pub fn build_kernels(params: &OpticalParameters, config: &SimulationConfig) -> Result<Kernels> {
    if config.is_per_channel(params) {
        let per_channel = |channel: Channel| {
            let wavelength_nm = channel.wavelength_nm();
            let defocus =
                effective_defocus(params.defocus_diopters, wavelength_nm, &config.calibration);
            channel_kernel(Some(channel), defocus, wavelength_nm, params, config)
        };
        let (red, (green, blue)) = rayon::join(
            || per_channel(Channel::Red),
            || rayon::join(|| per_channel(Channel::Green), || per_channel(Channel::Blue)),
        );
        let (red, green, blue) = (red?, green?, blue?);
        Ok(Kernels {
            psf: green.1,
            info: vec![red.2, green.2, blue.2],
            kernels: ChannelKernels::PerChannel([red.0, green.0, blue.0]),
        })
    } else {
        let wavelength_nm = params.wavelength_nm.unwrap_or(REFERENCE_WAVELENGTH_NM);
        let (kernel, psf, info) =
            channel_kernel(None, params.defocus_diopters, wavelength_nm, params, config)?;
        Ok(Kernels {
            kernels: ChannelKernels::Shared(kernel),
            info: vec![info],
            psf,
        })
    }
}
