//! Wavefront error over the pupil
//!
//! The phase is the sum of a quadratic defocus term and a saddle shaped
//! astigmatism term, both expressed as `k·W(x,y)` with `k = 2π/λ`.

use std::f64::consts::PI;

use nalgebra::{Rotation2, Vector2};
use ndarray::{Array2, Zip};

use crate::{params::Calibration, pupil::PupilGrid};

/// Wavefront aberrations of the eye
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Wavefront {
    /// defocus [D]
    pub defocus_diopters: f64,
    /// astigmatism magnitude [m]
    pub astigmatism_magnitude_m: f64,
    /// astigmatism axis [deg]
    pub astigmatism_axis_deg: f64,
}

impl Wavefront {
    pub fn new(defocus_diopters: f64) -> Self {
        Self {
            defocus_diopters,
            ..Default::default()
        }
    }
    pub fn astigmatism(mut self, magnitude_m: f64, axis_deg: f64) -> Self {
        self.astigmatism_magnitude_m = magnitude_m;
        self.astigmatism_axis_deg = axis_deg;
        self
    }
    /// Phase [rad] over the pupil grid at `wavelength_m`, zero outside the aperture
    pub fn phase(&self, grid: &PupilGrid, wavelength_m: f64, calibration: &Calibration) -> Array2<f64> {
        let mut phase = Array2::<f64>::zeros(grid.aperture.raw_dim());
        let k = 2f64 * PI / wavelength_m;

        if self.defocus_diopters != 0f64 {
            let alpha = calibration.defocus_curvature(self.defocus_diopters);
            Zip::from(&mut phase)
                .and(&grid.x)
                .and(&grid.y)
                .for_each(|p, &x, &y| *p += k * (x * x + y * y) * alpha);
        }

        if self.astigmatism_magnitude_m != 0f64 {
            let m = self.astigmatism_magnitude_m;
            let scale = m / (m + calibration.astigmatism_saturation_m);
            // coordinates in the frame of the cylinder axis
            let rot = Rotation2::new(-self.astigmatism_axis_deg.to_radians());
            Zip::from(&mut phase)
                .and(&grid.x)
                .and(&grid.y)
                .for_each(|p, &x, &y| {
                    let v = rot * Vector2::new(x, y);
                    *p += k * (v.x * v.x - v.y * v.y) * scale;
                });
        }

        phase *= &grid.aperture;
        phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> PupilGrid {
        PupilGrid::new(3.0, 32, 2).unwrap()
    }

    #[test]
    fn no_aberration_is_flat() {
        let grid = grid();
        let phase = Wavefront::new(0.0).phase(&grid, 550e-9, &Calibration::default());
        assert!(phase.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn defocus_is_odd_in_diopters() {
        let grid = grid();
        let cal = Calibration::default();
        let plus = Wavefront::new(1.5).phase(&grid, 550e-9, &cal);
        let minus = Wavefront::new(-1.5).phase(&grid, 550e-9, &cal);
        Zip::from(&plus)
            .and(&minus)
            .for_each(|&p, &m| assert_eq!(p, -m));
        assert!(plus.iter().any(|&p| p > 0.0));
    }

    #[test]
    fn defocus_is_paraxial_sag() {
        let grid = grid();
        let cal = Calibration::default();
        let wavelength = 550e-9;
        let phase = Wavefront::new(2.0).phase(&grid, wavelength, &cal);
        let (i, j) = (35, 40);
        let r2 = grid.x[[i, j]].powi(2) + grid.y[[i, j]].powi(2);
        assert_eq!(grid.aperture[[i, j]], 1.0);
        let expected = 2.0 * PI / wavelength * r2 * 2.0 * 0.5;
        assert!((phase[[i, j]] - expected).abs() < 1e-9 * expected.abs());
    }

    #[test]
    fn phase_is_masked() {
        let grid = grid();
        let phase = Wavefront::new(3.0)
            .astigmatism(1e-6, 30.0)
            .phase(&grid, 550e-9, &Calibration::default());
        Zip::from(&phase)
            .and(&grid.aperture)
            .for_each(|&p, &a| if a == 0.0 { assert_eq!(p, 0.0) });
    }

    #[test]
    fn astigmatism_saturates() {
        let grid = grid();
        let cal = Calibration::default();
        let small = Wavefront::new(0.0)
            .astigmatism(1e-7, 0.0)
            .phase(&grid, 550e-9, &cal);
        let large = Wavefront::new(0.0)
            .astigmatism(1e3, 0.0)
            .phase(&grid, 550e-9, &cal);
        let huge = Wavefront::new(0.0)
            .astigmatism(1e9, 0.0)
            .phase(&grid, 550e-9, &cal);
        let max_abs = |a: &Array2<f64>| a.iter().fold(0f64, |m, &p| m.max(p.abs()));
        assert!(max_abs(&small) < max_abs(&large));
        assert!((max_abs(&huge) - max_abs(&large)) / max_abs(&large) < 1e-6);
    }

    #[test]
    fn astigmatism_axis_rotates_the_saddle() {
        let grid = grid();
        let cal = Calibration::default();
        let at_0 = Wavefront::new(0.0)
            .astigmatism(1e-6, 0.0)
            .phase(&grid, 550e-9, &cal);
        let at_90 = Wavefront::new(0.0)
            .astigmatism(1e-6, 90.0)
            .phase(&grid, 550e-9, &cal);
        Zip::from(&at_0)
            .and(&at_90)
            .for_each(|&a, &b| assert!((a + b).abs() < 1e-9 * (1.0 + a.abs())));
    }
}
