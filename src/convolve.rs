//! Linear light convolution of RGBA images
//!
//! The color channels are premultiplied by alpha in display encoding, decoded
//! from sRGB to linear light and convolved; the result is un-premultiplied in
//! linear light and re-encoded. Alpha itself is not blurred.
//!
//! The convolution keeps the image size ("same" mode) with the image zero
//! padded, so the borders darken by the share of the kernel falling outside.

use image::{Rgba, RgbaImage};
use ndarray::{Array2, ShapeError, Zip};
use rayon::prelude::*;
use rustfft::{num_complex::Complex64, FftDirection};
use strum::IntoEnumIterator;

use crate::{chromatic::Channel, error::ErrorKind, fft::fft2, srgb};

/// Largest kernel (in taps) convolved in the spatial domain, larger ones go through the FFT
const DIRECT_MAX_TAPS: usize = 225;
/// Lower bound of alpha when un-premultiplying
const ALPHA_FLOOR: f64 = 1e-6;

#[derive(Debug, thiserror::Error)]
pub enum ConvolveError {
    #[error("empty {0}x{1} kernel")]
    EmptyKernel(usize, usize),
    #[error("empty {0}x{1} image")]
    EmptyImage(u32, u32),
    #[error("inconsistent array shape")]
    Shape(#[from] ShapeError),
}
impl ConvolveError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::DimensionMismatch
    }
}
type Result<T> = std::result::Result<T, ConvolveError>;

/// Convolution kernels applied to the color channels
#[derive(Debug, Clone)]
pub enum ChannelKernels {
    /// the same kernel for red, green and blue
    Shared(Array2<f64>),
    /// one kernel per channel, in red, green, blue order
    PerChannel([Array2<f64>; 3]),
}
impl ChannelKernels {
    pub fn kernel(&self, channel: Channel) -> &Array2<f64> {
        match self {
            ChannelKernels::Shared(kernel) => kernel,
            ChannelKernels::PerChannel(kernels) => &kernels[channel.index()],
        }
    }
    /// The kernel of the green channel
    pub fn reference(&self) -> &Array2<f64> {
        self.kernel(Channel::Green)
    }
    /// Checks that no kernel is empty
    fn check(&self) -> Result<()> {
        let kernels: Vec<&Array2<f64>> = match self {
            ChannelKernels::Shared(kernel) => vec![kernel],
            ChannelKernels::PerChannel(kernels) => kernels.iter().collect(),
        };
        for kernel in kernels {
            let (kr, kc) = kernel.dim();
            if kr == 0 || kc == 0 {
                return Err(ConvolveError::EmptyKernel(kr, kc));
            }
        }
        Ok(())
    }
}

/// Spatial domain convolution, rows processed in parallel
///
/// Taps landing outside the input contribute nothing, whatever the kernel size.
fn convolve_direct(input: &Array2<f64>, kernel: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = input.dim();
    let (kr, kc) = kernel.dim();
    let (cr, cc) = ((kr / 2) as isize, (kc / 2) as isize);
    let mut output = Array2::<f64>::zeros((rows, cols));
    Zip::indexed(&mut output).par_for_each(|(i, j), out| {
        let mut sum = 0f64;
        for ((ki, kj), &w) in kernel.indexed_iter() {
            let ii = i as isize + cr - ki as isize;
            let jj = j as isize + cc - kj as isize;
            if ii >= 0 && ii < rows as isize && jj >= 0 && jj < cols as isize {
                sum += input[[ii as usize, jj as usize]] * w;
            }
        }
        *out = sum;
    });
    output
}

/// Zero padded FFT convolution, cropped to the input size
fn convolve_fft(input: &Array2<f64>, kernel: &Array2<f64>) -> Result<Array2<f64>> {
    let (rows, cols) = input.dim();
    let (kr, kc) = kernel.dim();
    let shape = (rows + kr - 1, cols + kc - 1);

    let pad = |a: &Array2<f64>| {
        let mut padded = Array2::<Complex64>::zeros(shape);
        padded
            .slice_mut(ndarray::s![..a.nrows(), ..a.ncols()])
            .zip_mut_with(a, |p, &x| *p = Complex64::new(x, 0f64));
        padded
    };
    let mut spectrum = fft2(&pad(input), FftDirection::Forward)?;
    spectrum *= &fft2(&pad(kernel), FftDirection::Forward)?;
    let full = fft2(&spectrum, FftDirection::Inverse)?;

    let scale = (shape.0 * shape.1) as f64;
    let (cr, cc) = (kr / 2, kc / 2);
    Ok(full
        .slice(ndarray::s![cr..cr + rows, cc..cc + cols])
        .mapv(|z| z.re / scale))
}

/// "Same" size linear convolution with zero padding
pub fn convolve_same(input: &Array2<f64>, kernel: &Array2<f64>) -> Result<Array2<f64>> {
    if kernel.len() <= DIRECT_MAX_TAPS {
        Ok(convolve_direct(input, kernel))
    } else {
        convolve_fft(input, kernel)
    }
}

/// Convolves the color channels of an sRGB encoded RGBA image in linear light
///
/// Kernels of any size, larger than the image included, are accepted. The
/// alpha channel of the output is the alpha channel of the input.
pub fn convolve_in_linear_light(image: &RgbaImage, kernels: &ChannelKernels) -> Result<RgbaImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ConvolveError::EmptyImage(width, height));
    }
    kernels.check()?;
    let (rows, cols) = (height as usize, width as usize);

    let alpha = Array2::from_shape_fn((rows, cols), |(i, j)| {
        image.get_pixel(j as u32, i as u32)[3] as f64 / 255.0
    });
    let premultiplied: Vec<Array2<f64>> = Channel::iter()
        .map(|channel| {
            Array2::from_shape_fn((rows, cols), |(i, j)| {
                let value = image.get_pixel(j as u32, i as u32)[channel.index()] as f64 / 255.0;
                srgb::to_linear(value * alpha[[i, j]])
            })
        })
        .collect();

    let blurred = Channel::iter()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|channel| convolve_same(&premultiplied[channel.index()], kernels.kernel(channel)))
        .collect::<Result<Vec<_>>>()?;

    Ok(RgbaImage::from_fn(width, height, |x, y| {
        let (i, j) = (y as usize, x as usize);
        let a = alpha[[i, j]].max(ALPHA_FLOOR);
        Rgba([
            srgb::linear_to_u8(blurred[0][[i, j]] / a),
            srgb::linear_to_u8(blurred[1][[i, j]] / a),
            srgb::linear_to_u8(blurred[2][[i, j]] / a),
            image.get_pixel(x, y)[3],
        ])
    }))
}
