//! Pupil plane sampling
//!
//! The pupil plane is sampled on a square grid of `N x oversample` points
//! spanning twice the pupil diameter, so the aperture sits well inside the
//! field and the discrete Fourier transform does not wrap it around.

use ndarray::Array2;

use crate::error::ErrorKind;

/// Ratio between the grid physical extent and the pupil diameter
pub const GRID_EXTENT_FACTOR: f64 = 2.0;

#[derive(Debug, thiserror::Error)]
pub enum PupilError {
    #[error("pupil diameter must be positive and finite, found {0}mm")]
    Diameter(f64),
    #[error("grid resolution must be at least 1, found {0}")]
    Resolution(usize),
    #[error("oversampling factor must be at least 1, found {0}")]
    Oversample(usize),
    #[error("no grid sample falls inside the {1}mm pupil on a {0}x{0} grid")]
    Unresolved(usize, f64),
}
impl PupilError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidParameter
    }
}
type Result<T> = std::result::Result<T, PupilError>;

/// Square sampling grid over the pupil plane with its circular aperture
#[derive(Debug, Clone)]
pub struct PupilGrid {
    /// x coordinates [m], constant along columns
    pub x: Array2<f64>,
    /// y coordinates [m], constant along rows
    pub y: Array2<f64>,
    /// 1 inside the pupil, 0 outside
    pub aperture: Array2<f64>,
    /// grid physical extent [m]
    pub extent_m: f64,
    /// pupil diameter [m]
    pub pupil_diameter_m: f64,
    /// target (downsampled) resolution
    pub resolution: usize,
    pub oversample: usize,
}

/// Sample coordinates spanning `[-extent/2, extent/2]`, a single sample sits at the origin
fn linspace(n: usize, extent: f64) -> Vec<f64> {
    if n == 1 {
        return vec![0f64];
    }
    let step = extent / (n - 1) as f64;
    let half = (n - 1) as f64 * 0.5;
    (0..n).map(|i| (i as f64 - half) * step).collect()
}

impl PupilGrid {
    /// Builds the grid for a pupil of `pupil_diameter_mm` at `resolution x oversample` samples
    pub fn new(pupil_diameter_mm: f64, resolution: usize, oversample: usize) -> Result<Self> {
        if !(pupil_diameter_mm.is_finite() && pupil_diameter_mm > 0f64) {
            return Err(PupilError::Diameter(pupil_diameter_mm));
        }
        if resolution < 1 {
            return Err(PupilError::Resolution(resolution));
        }
        if oversample < 1 {
            return Err(PupilError::Oversample(oversample));
        }
        let pupil_diameter_m = pupil_diameter_mm * 1e-3;
        let extent_m = pupil_diameter_m * GRID_EXTENT_FACTOR;
        let n = resolution * oversample;

        let u = linspace(n, extent_m);
        let x = Array2::from_shape_fn((n, n), |(_, j)| u[j]);
        let y = Array2::from_shape_fn((n, n), |(i, _)| u[i]);
        let r2_max = (pupil_diameter_m * 0.5).powi(2);
        // built from the 1D samples so that the mask only depends on x²+y²
        let aperture = Array2::from_shape_fn((n, n), |(i, j)| {
            if u[j] * u[j] + u[i] * u[i] <= r2_max {
                1f64
            } else {
                0f64
            }
        });
        if aperture.sum() == 0f64 {
            return Err(PupilError::Unresolved(n, pupil_diameter_mm));
        }
        log::debug!(
            "pupil grid: {n}x{n} samples over {:.3}mm, {} samples in the aperture",
            extent_m * 1e3,
            aperture.sum()
        );
        Ok(Self {
            x,
            y,
            aperture,
            extent_m,
            pupil_diameter_m,
            resolution,
            oversample,
        })
    }
    /// Number of samples along one side of the grid
    pub fn size(&self) -> usize {
        self.aperture.nrows()
    }
    /// Pupil plane sample spacing at the target resolution [m]
    pub fn pixel_scale_m(&self) -> f64 {
        self.extent_m / self.resolution as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_size_and_extent() {
        let grid = PupilGrid::new(3.0, 64, 2).unwrap();
        assert_eq!(grid.size(), 128);
        assert_eq!(grid.x.dim(), (128, 128));
        assert!((grid.x[[0, 0]] + 3e-3).abs() < 1e-15);
        assert!((grid.x[[0, 127]] - 3e-3).abs() < 1e-15);
        assert!((grid.pixel_scale_m() - 6e-3 / 64.0).abs() < 1e-15);
    }

    #[test]
    fn oversampling_keeps_field_of_view() {
        let coarse = PupilGrid::new(4.0, 32, 1).unwrap();
        let fine = PupilGrid::new(4.0, 32, 4).unwrap();
        assert_eq!(coarse.extent_m, fine.extent_m);
        assert!((coarse.x[[0, 0]] - fine.x[[0, 0]]).abs() < 1e-15);
        assert!((coarse.y[[31, 0]] - fine.y[[127, 0]]).abs() < 1e-15);
        // the aperture covers about the same fraction of the field
        let fraction = |g: &PupilGrid| g.aperture.sum() / g.aperture.len() as f64;
        let expected = std::f64::consts::PI / 16.0;
        assert!((fraction(&fine) - expected).abs() < 0.01);
        assert!((fraction(&coarse) - expected).abs() < 0.03);
    }

    #[test]
    fn aperture_is_circularly_symmetric() {
        let grid = PupilGrid::new(3.0, 50, 1).unwrap();
        let a = &grid.aperture;
        let n = grid.size();
        for i in 0..n {
            for j in 0..n {
                assert_eq!(a[[i, j]], a[[j, i]]);
                assert_eq!(a[[i, j]], a[[n - 1 - i, j]]);
                assert_eq!(a[[i, j]], a[[i, n - 1 - j]]);
            }
        }
    }

    #[test]
    fn invalid_parameters() {
        assert!(matches!(
            PupilGrid::new(0.0, 64, 1),
            Err(PupilError::Diameter(_))
        ));
        assert!(matches!(
            PupilGrid::new(-3.0, 64, 1),
            Err(PupilError::Diameter(_))
        ));
        assert!(matches!(
            PupilGrid::new(f64::NAN, 64, 1),
            Err(PupilError::Diameter(_))
        ));
        assert!(matches!(
            PupilGrid::new(3.0, 0, 1),
            Err(PupilError::Resolution(0))
        ));
        assert!(matches!(
            PupilGrid::new(3.0, 8, 0),
            Err(PupilError::Oversample(0))
        ));
        assert!(matches!(
            PupilGrid::new(3.0, 2, 1),
            Err(PupilError::Unresolved(2, _))
        ));
    }

    #[test]
    fn single_sample_grid() {
        let grid = PupilGrid::new(3.0, 1, 1).unwrap();
        assert_eq!(grid.aperture[[0, 0]], 1.0);
    }
}
