//! Longitudinal chromatic aberration of the eye
//!
//! The eye focuses short wavelengths in front of long ones: relative to the
//! photopic reference at 555nm, blue light sees more myopic defocus and red
//! light less. The shift is linear in wavelength with a calibrated slope.

use ndarray::Array2;
use serde::Serialize;
use strum_macros::{Display, EnumIter};

use crate::params::{Calibration, REFERENCE_WAVELENGTH_NM};

/// Color channels of an RGB display
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, Display, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[strum(serialize = "red")]
    Red,
    #[strum(serialize = "green")]
    Green,
    #[strum(serialize = "blue")]
    Blue,
}
impl Channel {
    /// Representative wavelength of the display primary [nm]
    pub fn wavelength_nm(&self) -> f64 {
        match self {
            Channel::Red => 610.0,
            Channel::Green => 555.0,
            Channel::Blue => 470.0,
        }
    }
    pub fn index(&self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }
}

/// Effective defocus at `wavelength_nm` of an eye with `defocus_diopters` at the reference wavelength
pub fn effective_defocus(defocus_diopters: f64, wavelength_nm: f64, calibration: &Calibration) -> f64 {
    defocus_diopters + (REFERENCE_WAVELENGTH_NM - wavelength_nm) * calibration.chroma_slope_d_per_nm
}

/// Screen geometry used by the Gaussian approximation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Screen {
    /// pixel density [px/mm]
    pub px_per_mm: f64,
    /// eye to screen distance [m]
    pub viewing_distance_m: f64,
}
impl Default for Screen {
    fn default() -> Self {
        Self {
            px_per_mm: 4.0,
            viewing_distance_m: 1.0,
        }
    }
}

/// Standard deviation [px] of the Gaussian standing for the defocus blur
///
/// The blur circle subtends `pupil · |D|` radians; projected on the screen at
/// the viewing distance, its diameter is converted to pixels and the standard
/// deviation per axis of a uniform disc is a quarter of its diameter.
pub fn gaussian_sigma_px(defocus_diopters: f64, pupil_diameter_mm: f64, screen: &Screen) -> f64 {
    let blur_diameter_mm = pupil_diameter_mm * defocus_diopters.abs() * screen.viewing_distance_m;
    0.25 * blur_diameter_mm * screen.px_per_mm
}

/// Side `2·⌈3σ⌉+1` of the Gaussian kernel, 1 when `σ = 0`
///
/// Returned as a float so that it can be checked before any allocation.
pub fn gaussian_kernel_size(sigma: f64) -> f64 {
    if sigma > 0f64 {
        2f64 * (3f64 * sigma).ceil() + 1f64
    } else {
        1f64
    }
}

/// Normalized Gaussian kernel of size `2·⌈3σ⌉+1`, a single unit tap when `σ = 0`
pub fn gaussian_kernel(sigma: f64) -> Array2<f64> {
    if !(sigma > 0f64) {
        return Array2::ones((1, 1));
    }
    let radius = (3f64 * sigma).ceil() as usize;
    let size = 2 * radius + 1;
    let center = radius as f64;
    let mut kernel = Array2::from_shape_fn((size, size), |(i, j)| {
        let (y, x) = (i as f64 - center, j as f64 - center);
        (-(x * x + y * y) / (2f64 * sigma * sigma)).exp()
    });
    let sum = kernel.sum();
    kernel.mapv_inplace(|x| x / sum);
    kernel
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn reference_wavelength_is_unshifted() {
        let cal = Calibration::default();
        assert_eq!(effective_defocus(-2.0, 555.0, &cal), -2.0);
        assert_eq!(effective_defocus(-2.0, Channel::Green.wavelength_nm(), &cal), -2.0);
    }

    #[test]
    fn red_and_blue_shift_in_opposite_directions() {
        let cal = Calibration::default();
        for &d in &[-3.0, -0.5, 0.25, 2.0] {
            let green = effective_defocus(d, Channel::Green.wavelength_nm(), &cal);
            let red = effective_defocus(d, Channel::Red.wavelength_nm(), &cal);
            let blue = effective_defocus(d, Channel::Blue.wavelength_nm(), &cal);
            assert!((red - green) * (blue - green) < 0.0);
            assert!(red < green && blue > green);
        }
        let red = effective_defocus(0.0, 610.0, &cal);
        assert!((red + 0.165).abs() < 1e-12);
    }

    #[test]
    fn sigma_grows_with_defocus_magnitude() {
        let screen = Screen::default();
        let sigmas: Vec<f64> = [0.0, 0.5, 1.0, 2.0, 4.0]
            .iter()
            .map(|&d| gaussian_sigma_px(d, 3.0, &screen))
            .collect();
        sigmas.windows(2).for_each(|w| assert!(w[1] > w[0]));
        assert_eq!(sigmas[0], 0.0);
        assert_eq!(gaussian_sigma_px(-2.0, 3.0, &screen), gaussian_sigma_px(2.0, 3.0, &screen));
        assert!((gaussian_sigma_px(-2.0, 3.0, &screen) - 6.0).abs() < 1e-12);
        assert!(gaussian_sigma_px(2.0, 6.0, &screen) > gaussian_sigma_px(2.0, 3.0, &screen));
    }

    #[test]
    fn channel_sigmas_straddle_green() {
        let cal = Calibration::default();
        let screen = Screen::default();
        let sigma = |d: f64, c: Channel| {
            gaussian_sigma_px(effective_defocus(d, c.wavelength_nm(), &cal), 3.0, &screen)
        };
        // myopic eye: blue is more defocused than green, red less
        assert!(sigma(-2.0, Channel::Red) > sigma(-2.0, Channel::Green));
        assert!(sigma(-2.0, Channel::Blue) < sigma(-2.0, Channel::Green));
        // hyperopic eye: the other way around
        assert!(sigma(2.0, Channel::Red) < sigma(2.0, Channel::Green));
        assert!(sigma(2.0, Channel::Blue) > sigma(2.0, Channel::Green));
    }

    #[test]
    fn gaussian_kernel_is_normalized() {
        let kernel = gaussian_kernel(1.5);
        assert_eq!(kernel.dim(), (11, 11));
        assert!((kernel.sum() - 1.0).abs() < 1e-12);
        assert!(kernel[[5, 5]] > kernel[[5, 6]]);
        assert_eq!(kernel[[5, 6]], kernel[[6, 5]]);
        assert_eq!(gaussian_kernel(0.0), Array2::<f64>::ones((1, 1)));
        assert_eq!(gaussian_kernel_size(1.5), 11.0);
        assert_eq!(gaussian_kernel_size(0.0), 1.0);
    }

    #[test]
    fn channel_order() {
        let indices: Vec<usize> = Channel::iter().map(|c| c.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(Channel::Blue.to_string(), "blue");
    }
}
