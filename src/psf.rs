/*!
# Point spread function

Fraunhofer (far field) point spread function of the eye: the squared modulus
of the Fourier transform of the complex pupil function
`P = aperture · exp(i·phase)`.

The pupil is sampled `oversample` times finer than the requested PSF
resolution to reduce the aliasing of the discrete transform; the intensity is
then summed over `oversample x oversample` blocks, which conserves energy.

```rust,no_run
use ocular_psf::generate_psf;

let psf = generate_psf(-1.5, 3.0, 550.0, 0.0, 0.0, 256, 2)?;
println!("PSF peak: {:.3e}, spread: {:.2}px²", psf.peak(), psf.second_moment());
psf.save("psf.png")?;
# Ok::<(), ocular_psf::Error>(())
```
*/

use std::{
    fs::File,
    io::{self, BufWriter},
    path::{Path, PathBuf},
};

use image::{ImageBuffer, ImageError, Rgb};
use ndarray::{Array2, ShapeError, Zip};
use npyz::WriterBuilder;
use rustfft::{num_complex::Complex64, FftDirection};

use crate::{
    error::ErrorKind,
    fft::{fft2, fftshift, ifftshift},
    params::Calibration,
    pupil::{PupilError, PupilGrid},
    wavefront::Wavefront,
};

/// Regularization of the energy normalization
const ENERGY_EPSILON: f64 = 1e-16;

#[derive(Debug, thiserror::Error)]
pub enum PsfError {
    #[error("failed to build the pupil grid")]
    Pupil(#[from] PupilError),
    #[error("wavelength must be positive and finite, found {0}nm")]
    Wavelength(f64),
    #[error("astigmatism magnitude must be positive or zero, found {0}m")]
    Astigmatism(f64),
    #[error("inconsistent array shape")]
    Shape(#[from] ShapeError),
    #[error("failed to create image buffer")]
    Image,
    #[error("failed to save PSF to png file {1:?}")]
    Save(#[source] ImageError, PathBuf),
    #[error("failed to write PSF to npy file {1:?}")]
    Npy(#[source] io::Error, PathBuf),
}
impl PsfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PsfError::Pupil(e) => e.kind(),
            PsfError::Wavelength(_) | PsfError::Astigmatism(_) => ErrorKind::InvalidParameter,
            PsfError::Shape(_) => ErrorKind::DimensionMismatch,
            PsfError::Image | PsfError::Save(..) | PsfError::Npy(..) => ErrorKind::Export,
        }
    }
}
type Result<T> = std::result::Result<T, PsfError>;

/// Energy normalized intensity point spread function
#[derive(Debug, Clone)]
pub struct Psf {
    pub(crate) data: Array2<f64>,
    /// pupil plane sample spacing at the PSF resolution [m]
    pub pixel_scale_m: f64,
    /// wavelength [m]
    pub wavelength_m: f64,
    /// pupil grid extent [m]
    pub grid_extent_m: f64,
    pub oversample: usize,
}

/// Sums the non-overlapping `s x s` blocks of a square array
fn block_sum(field: &Array2<f64>, s: usize) -> Array2<f64> {
    let n = field.nrows() / s;
    Array2::from_shape_fn((n, n), |(i, j)| {
        field
            .slice(ndarray::s![i * s..(i + 1) * s, j * s..(j + 1) * s])
            .sum()
    })
}

/// Divides by the total energy
fn normalize(field: &mut Array2<f64>) {
    let total = field.sum() + ENERGY_EPSILON;
    field.mapv_inplace(|x| x / total);
}

impl Psf {
    /// Computes the PSF of the eye at `wavelength_m` on the given pupil grid
    pub fn from_pupil(
        grid: &PupilGrid,
        wavefront: &Wavefront,
        wavelength_m: f64,
        calibration: &Calibration,
    ) -> Result<Self> {
        let phase = wavefront.phase(grid, wavelength_m, calibration);

        let mut pupil = Array2::<Complex64>::zeros(phase.raw_dim());
        Zip::from(&mut pupil)
            .and(&grid.aperture)
            .and(&phase)
            .for_each(|p, &a, &phi| *p = Complex64::from_polar(a, phi));

        let field = fftshift(&fft2(&ifftshift(&pupil), FftDirection::Forward)?);
        let mut intensity = field.mapv(|e| e.norm_sqr());
        normalize(&mut intensity);

        let mut data = if grid.oversample > 1 {
            block_sum(&intensity, grid.oversample)
        } else {
            intensity
        };
        normalize(&mut data);

        let this = Self {
            data,
            pixel_scale_m: grid.pixel_scale_m(),
            wavelength_m,
            grid_extent_m: grid.extent_m,
            oversample: grid.oversample,
        };
        log::debug!(
            "PSF {:?} @ {:.0}nm: sum={:.9}, peak={:.4e}",
            this.data.dim(),
            wavelength_m * 1e9,
            this.sum(),
            this.peak()
        );
        Ok(this)
    }
    /// PSF intensities
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }
    pub fn into_data(self) -> Array2<f64> {
        self.data
    }
    /// PSF resolution
    pub fn resolution(&self) -> usize {
        self.data.nrows()
    }
    pub fn sum(&self) -> f64 {
        self.data.sum()
    }
    pub fn peak(&self) -> f64 {
        self.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }
    /// Location (row, column) of the PSF maximum
    pub fn peak_index(&self) -> (usize, usize) {
        let mut index = (0, 0);
        let mut peak = f64::NEG_INFINITY;
        for ((i, j), &v) in self.data.indexed_iter() {
            if v > peak {
                peak = v;
                index = (i, j);
            }
        }
        index
    }
    /// Angular size of a PSF pixel [rad]
    pub fn angular_scale_rad(&self) -> f64 {
        self.wavelength_m * self.oversample as f64 / self.grid_extent_m
    }
    /// Intensity weighted center (row, column) [pixel]
    pub fn centroid(&self) -> (f64, f64) {
        let total = self.sum();
        let (ci, cj) = self
            .data
            .indexed_iter()
            .fold((0f64, 0f64), |(ci, cj), ((i, j), &v)| {
                (ci + i as f64 * v, cj + j as f64 * v)
            });
        (ci / total, cj / total)
    }
    /// Intensity weighted mean squared distance to the centroid [pixel²]
    pub fn second_moment(&self) -> f64 {
        let total = self.sum();
        let (ci, cj) = self.centroid();
        self.data
            .indexed_iter()
            .map(|((i, j), &v)| ((i as f64 - ci).powi(2) + (j as f64 - cj).powi(2)) * v)
            .sum::<f64>()
            / total
    }
    /// Normalize the PSF to 0.0-1.0 range and apply the CUBEHELIX colormap
    fn to_rgb(&self) -> Vec<u8> {
        let peak = self.peak();
        self.data
            .iter()
            .flat_map(|&x| {
                let value = if peak > 0f64 { x / peak } else { 0f64 };
                let color = colorous::CUBEHELIX.eval_continuous(value);
                [color.r, color.g, color.b]
            })
            .collect()
    }
    /// Saves the PSF as a PNG image with the CUBEHELIX colormap
    pub fn save(&self, filename: impl AsRef<Path>) -> Result<()> {
        let n = self.resolution() as u32;
        let image = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(n, n, self.to_rgb())
            .ok_or_else(|| PsfError::Image)?;
        image
            .save(&filename)
            .map_err(|e| PsfError::Save(e, filename.as_ref().to_path_buf()))?;
        Ok(())
    }
    /// Writes the PSF intensities to a `.npy` file
    pub fn to_npy(&self, filename: impl AsRef<Path>) -> Result<()> {
        let path = filename.as_ref().to_path_buf();
        let n = self.resolution() as u64;
        let write = || -> io::Result<()> {
            let mut file = BufWriter::new(File::create(&path)?);
            let mut writer = npyz::WriteOptions::<f64>::new()
                .default_dtype()
                .shape(&[n, n])
                .writer(&mut file)
                .begin_nd()?;
            writer.extend(self.data.iter().cloned())?;
            writer.finish()
        };
        write().map_err(|e| PsfError::Npy(e, path.clone()))
    }
}

/// Computes the PSF with the default [Calibration]
///
/// Returns an `resolution x resolution` PSF normalized to unit energy, and
/// its pupil plane pixel scale `2 x pupil diameter / resolution`.
pub fn generate_psf(
    defocus_diopters: f64,
    pupil_diameter_mm: f64,
    wavelength_nm: f64,
    astig_magnitude_m: f64,
    astig_axis_deg: f64,
    resolution: usize,
    oversample: usize,
) -> Result<Psf> {
    generate_psf_with(
        &Wavefront::new(defocus_diopters).astigmatism(astig_magnitude_m, astig_axis_deg),
        pupil_diameter_mm,
        wavelength_nm,
        resolution,
        oversample,
        &Calibration::default(),
    )
}

/// Computes the PSF of the eye with the given aberrations and calibration
pub fn generate_psf_with(
    wavefront: &Wavefront,
    pupil_diameter_mm: f64,
    wavelength_nm: f64,
    resolution: usize,
    oversample: usize,
    calibration: &Calibration,
) -> Result<Psf> {
    if !(wavelength_nm.is_finite() && wavelength_nm > 0f64) {
        return Err(PsfError::Wavelength(wavelength_nm));
    }
    let m = wavefront.astigmatism_magnitude_m;
    if !(m.is_finite() && m >= 0f64) {
        return Err(PsfError::Astigmatism(m));
    }
    let grid = PupilGrid::new(pupil_diameter_mm, resolution, oversample)?;
    Psf::from_pupil(&grid, wavefront, wavelength_nm * 1e-9, calibration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spread(defocus: f64, oversample: usize) -> f64 {
        generate_psf(defocus, 3.0, 550.0, 0.0, 0.0, 64, oversample)
            .unwrap()
            .second_moment()
    }

    #[test]
    fn diffraction_limited_scenario() {
        let psf = generate_psf(0.0, 3.0, 550.0, 0.0, 0.0, 64, 2).unwrap();
        assert_eq!(psf.data().dim(), (64, 64));
        assert!((psf.sum() - 1.0).abs() < 1e-6);
        assert_eq!(psf.peak_index(), (32, 32));
        assert!(psf.data().iter().all(|&x| x >= 0.0));
        assert!((psf.pixel_scale_m - 6e-3 / 64.0).abs() < 1e-15);
    }

    #[test]
    fn energy_is_conserved() {
        for &(defocus, astig, axis, oversample) in &[
            (-2.0, 0.0, 0.0, 1),
            (1.0, 1e-6, 45.0, 2),
            (0.5, 5e-7, 10.0, 3),
            (-0.75, 0.0, 0.0, 4),
        ] {
            let psf = generate_psf(defocus, 4.0, 600.0, astig, axis, 32, oversample).unwrap();
            assert_eq!(psf.resolution(), 32);
            assert!((psf.sum() - 1.0).abs() < 1e-6, "sum = {}", psf.sum());
            assert!(psf.data().iter().all(|&x| x >= 0.0));
        }
    }

    #[test]
    fn diffraction_limited_symmetry() {
        let psf = generate_psf(0.0, 3.0, 550.0, 0.0, 0.0, 64, 1).unwrap();
        let a = psf.data();
        let c = 32;
        let tol = 1e-9 * psf.peak();
        assert_eq!(psf.peak_index(), (c, c));
        for i in 1..64 {
            for j in 1..64 {
                let (ri, rj) = (2 * c - i, 2 * c - j);
                assert!((a[[i, j]] - a[[j, i]]).abs() < tol);
                assert!((a[[i, j]] - a[[ri, j]]).abs() < tol);
                assert!((a[[i, j]] - a[[i, rj]]).abs() < tol);
                // quarter turn about the center
                assert!((a[[i, j]] - a[[j, ri]]).abs() < tol);
            }
        }
    }

    #[test]
    fn oversampled_psf_is_transpose_symmetric() {
        let psf = generate_psf(0.0, 3.0, 550.0, 0.0, 0.0, 64, 2).unwrap();
        let a = psf.data();
        let tol = 1e-9 * psf.peak();
        Zip::from(a)
            .and(&a.t())
            .for_each(|&x, &y| assert!((x - y).abs() < tol));
    }

    #[test]
    fn blur_grows_with_defocus() {
        let spreads: Vec<f64> = [0.0, 0.5, 1.0, 1.5, 2.0]
            .iter()
            .map(|&d| spread(d, 2))
            .collect();
        spreads
            .windows(2)
            .for_each(|w| assert!(w[1] >= w[0], "{:?}", spreads));
        assert!(spreads[4] > 4.0 * spreads[0]);
    }

    #[test]
    fn blur_is_sign_symmetric() {
        for &d in &[0.5, 1.25] {
            let (plus, minus) = (spread(d, 1), spread(-d, 1));
            assert!((plus - minus).abs() < 1e-3 * plus, "{plus} vs {minus}");
        }
    }

    #[test]
    fn defocus_lowers_the_peak() {
        let sharp = generate_psf(0.0, 3.0, 550.0, 0.0, 0.0, 64, 2).unwrap();
        let blurred = generate_psf(-2.0, 3.0, 550.0, 0.0, 0.0, 64, 2).unwrap();
        assert!(blurred.peak() < sharp.peak());
    }

    #[test]
    fn astigmatism_rotates_with_its_axis() {
        let psf = generate_psf(0.0, 3.0, 550.0, 1e-5, 0.0, 64, 2).unwrap();
        let (ci, cj) = psf.centroid();
        let (var_i, var_j) = psf.data().indexed_iter().fold((0f64, 0f64), |(vi, vj), ((i, j), &v)| {
            (vi + (i as f64 - ci).powi(2) * v, vj + (j as f64 - cj).powi(2) * v)
        });
        let rotated = generate_psf(0.0, 3.0, 550.0, 1e-5, 45.0, 64, 2).unwrap();
        assert!((psf.sum() - 1.0).abs() < 1e-6);
        assert!((var_i - var_j).abs() < 0.05 * (var_i + var_j));
        assert!((psf.second_moment() - rotated.second_moment()).abs() < 0.1 * psf.second_moment());
    }

    #[test]
    fn angular_scale() {
        let psf = generate_psf(0.0, 3.0, 500.0, 0.0, 0.0, 16, 2).unwrap();
        assert!((psf.angular_scale_rad() - 500e-9 * 2.0 / 6e-3).abs() < 1e-15);
    }

    #[test]
    fn invalid_parameters() {
        let err = generate_psf(0.0, 0.0, 550.0, 0.0, 0.0, 64, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        let err = generate_psf(0.0, 3.0, 550.0, 0.0, 0.0, 0, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        let err = generate_psf(0.0, 3.0, -550.0, 0.0, 0.0, 64, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        let err = generate_psf(0.0, 3.0, 550.0, -1.0, 0.0, 64, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn block_sum_conserves_energy() {
        let a = Array2::from_shape_fn((6, 6), |(i, j)| (i + j) as f64);
        let b = block_sum(&a, 3);
        assert_eq!(b.dim(), (2, 2));
        assert_eq!(b.sum(), a.sum());
        assert_eq!(b[[0, 0]], 18.0);
    }
}
