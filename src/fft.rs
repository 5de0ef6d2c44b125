//! 2D discrete Fourier transforms over `ndarray` fields

use ndarray::{Array2, ShapeError};
use rustfft::{num_complex::Complex64, FftDirection, FftPlanner};

/// 2D FFT: 1D transforms along the rows, then along the columns (unnormalized)
pub fn fft2(field: &Array2<Complex64>, direction: FftDirection) -> Result<Array2<Complex64>, ShapeError> {
    let (rows, cols) = field.dim();
    let mut planner = FftPlanner::<f64>::new();

    // rustfft processes the buffer as consecutive transforms of the planned length
    let mut buffer: Vec<Complex64> = field.iter().cloned().collect();
    planner.plan_fft(cols, direction).process(&mut buffer);
    let along_rows = Array2::from_shape_vec((rows, cols), buffer)?;

    let mut buffer: Vec<Complex64> = along_rows.t().iter().cloned().collect();
    planner.plan_fft(rows, direction).process(&mut buffer);
    let transposed = Array2::from_shape_vec((cols, rows), buffer)?;

    Ok(transposed.reversed_axes().as_standard_layout().into_owned())
}

/// Circularly shifts both axes so that element `(i, j)` moves to `(i + si, j + sj)`
fn roll<T: Clone>(field: &Array2<T>, si: usize, sj: usize) -> Array2<T> {
    let (rows, cols) = field.dim();
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        field[[(i + rows - si % rows) % rows, (j + cols - sj % cols) % cols]].clone()
    })
}

/// Moves the zero frequency from the origin to the center `(n/2, n/2)`
pub fn fftshift<T: Clone>(field: &Array2<T>) -> Array2<T> {
    let (rows, cols) = field.dim();
    roll(field, rows / 2, cols / 2)
}

/// Inverse of [fftshift]: moves the center `(n/2, n/2)` to the origin
pub fn ifftshift<T: Clone>(field: &Array2<T>) -> Array2<T> {
    let (rows, cols) = field.dim();
    roll(field, rows - rows / 2, cols - cols / 2)
}
