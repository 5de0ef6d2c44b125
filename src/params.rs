//! Optical parameters of a simulation and the model calibration constants

use serde::{Deserialize, Serialize};

use crate::model::ModelError;

/// Wavelength of the photopic sensitivity peak [nm]
pub const REFERENCE_WAVELENGTH_NM: f64 = 555.0;

/// Optical parameters of the simulated eye and of the display shaping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpticalParameters {
    /// defocus [D], negative for myopia
    pub defocus_diopters: f64,
    /// entrance pupil diameter [mm]
    pub pupil_diameter_mm: f64,
    /// wavelength [nm], `None` for a trichromatic simulation
    pub wavelength_nm: Option<f64>,
    /// astigmatism magnitude [m]
    pub astigmatism_magnitude_m: f64,
    /// astigmatism axis [deg]
    pub astigmatism_axis_deg: f64,
    pub contrast: f64,
    pub gamma: f64,
}
impl Default for OpticalParameters {
    fn default() -> Self {
        Self {
            defocus_diopters: -2.0,
            pupil_diameter_mm: 3.0,
            wavelength_nm: Some(550.0),
            astigmatism_magnitude_m: 0.0,
            astigmatism_axis_deg: 0.0,
            contrast: 1.0,
            gamma: 1.0,
        }
    }
}
impl OpticalParameters {
    pub fn defocus(mut self, diopters: f64) -> Self {
        self.defocus_diopters = diopters;
        self
    }
    pub fn pupil(mut self, diameter_mm: f64) -> Self {
        self.pupil_diameter_mm = diameter_mm;
        self
    }
    pub fn wavelength(mut self, wavelength_nm: Option<f64>) -> Self {
        self.wavelength_nm = wavelength_nm;
        self
    }
    pub fn astigmatism(mut self, magnitude_m: f64, axis_deg: f64) -> Self {
        self.astigmatism_magnitude_m = magnitude_m;
        self.astigmatism_axis_deg = axis_deg;
        self
    }
    pub fn contrast_gamma(mut self, contrast: f64, gamma: f64) -> Self {
        self.contrast = contrast;
        self.gamma = gamma;
        self
    }
    /// Checks the parameters invariants
    pub fn validate(&self) -> Result<(), ModelError> {
        let finite = |name: &'static str, value: f64| {
            if value.is_finite() {
                Ok(())
            } else {
                Err(ModelError::InvalidParameter(name, value))
            }
        };
        finite("defocus_diopters", self.defocus_diopters)?;
        finite("astigmatism_axis_deg", self.astigmatism_axis_deg)?;
        finite("contrast", self.contrast)?;
        if !(self.pupil_diameter_mm.is_finite() && self.pupil_diameter_mm > 0f64) {
            return Err(ModelError::InvalidParameter(
                "pupil_diameter_mm",
                self.pupil_diameter_mm,
            ));
        }
        if !(self.gamma.is_finite() && self.gamma > 0f64) {
            return Err(ModelError::InvalidParameter("gamma", self.gamma));
        }
        if let Some(wavelength_nm) = self.wavelength_nm {
            if !(wavelength_nm.is_finite() && wavelength_nm > 0f64) {
                return Err(ModelError::InvalidParameter("wavelength_nm", wavelength_nm));
            }
        }
        if !(self.astigmatism_magnitude_m.is_finite() && self.astigmatism_magnitude_m >= 0f64) {
            return Err(ModelError::InvalidParameter(
                "astigmatism_magnitude_m",
                self.astigmatism_magnitude_m,
            ));
        }
        Ok(())
    }
}

/// Empirical constants of the optical model
///
/// None of these values is derived from a lens equation of the eye and none
/// has been validated against measured ocular point spread functions; they
/// set the visual strength of each effect and can be overridden per call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Wavefront curvature per diopter of defocus [m⁻¹/D]
    ///
    /// The defocus phase is `k·(x²+y²)·defocus_phase_scale·D`; the default of
    /// 0.5 is the paraxial sag `W = D·r²/2`.
    pub defocus_phase_scale: f64,
    /// Astigmatism magnitude at which the astigmatic phase reaches half its
    /// saturated value [m]
    pub astigmatism_saturation_m: f64,
    /// Longitudinal chromatic aberration slope [D/nm]
    pub chroma_slope_d_per_nm: f64,
}
impl Default for Calibration {
    fn default() -> Self {
        Self {
            defocus_phase_scale: 0.5,
            astigmatism_saturation_m: 1e-6,
            chroma_slope_d_per_nm: 0.003,
        }
    }
}
impl Calibration {
    /// Wavefront curvature `α(D)` [m⁻¹]
    pub fn defocus_curvature(&self, diopters: f64) -> f64 {
        self.defocus_phase_scale * diopters
    }
    pub fn validate(&self) -> Result<(), ModelError> {
        if !(self.defocus_phase_scale.is_finite() && self.defocus_phase_scale > 0f64) {
            return Err(ModelError::InvalidParameter(
                "defocus_phase_scale",
                self.defocus_phase_scale,
            ));
        }
        if !(self.astigmatism_saturation_m.is_finite() && self.astigmatism_saturation_m > 0f64) {
            return Err(ModelError::InvalidParameter(
                "astigmatism_saturation_m",
                self.astigmatism_saturation_m,
            ));
        }
        if !self.chroma_slope_d_per_nm.is_finite() {
            return Err(ModelError::InvalidParameter(
                "chroma_slope_d_per_nm",
                self.chroma_slope_d_per_nm,
            ));
        }
        Ok(())
    }
}
