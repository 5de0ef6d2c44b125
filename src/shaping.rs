//! Display contrast and gamma remapping

use image::RgbaImage;

/// Pivot of the contrast stretch
const MID_GRAY: f64 = 127.5;

/// Applies a contrast stretch about mid-gray followed by a gamma curve
///
/// Both steps work on the 8-bit display values of the color channels, alpha
/// is left untouched. A non-positive or non-finite `gamma` skips the gamma curve.
pub fn apply_contrast_gamma(image: &RgbaImage, contrast: f64, gamma: f64) -> RgbaImage {
    let apply_gamma = gamma.is_finite() && gamma > 0f64;
    let lut: Vec<u8> = (0..=255u8)
        .map(|v| {
            let mut out = ((v as f64 - MID_GRAY) * contrast + MID_GRAY).clamp(0.0, 255.0);
            if apply_gamma {
                out = (255.0 * (out / 255.0).powf(1.0 / gamma)).clamp(0.0, 255.0);
            }
            out.round() as u8
        })
        .collect();
    let mut output = image.clone();
    output.pixels_mut().for_each(|p| {
        for c in p.0.iter_mut().take(3) {
            *c = lut[*c as usize];
        }
    });
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient() -> RgbaImage {
        RgbaImage::from_fn(256, 2, |x, y| {
            Rgba([x as u8, 255 - x as u8, (x / 2) as u8, (y * 100 + 7) as u8])
        })
    }

    #[test]
    fn unit_contrast_and_gamma_is_identity() {
        let image = gradient();
        assert_eq!(apply_contrast_gamma(&image, 1.0, 1.0), image);
    }

    #[test]
    fn invalid_gamma_skips_the_gamma_curve() {
        let image = gradient();
        assert_eq!(apply_contrast_gamma(&image, 1.0, 0.0), image);
        assert_eq!(apply_contrast_gamma(&image, 1.0, -1.2), image);
        assert_eq!(apply_contrast_gamma(&image, 1.0, f64::NAN), image);
        assert_eq!(
            apply_contrast_gamma(&image, 1.3, 0.0),
            apply_contrast_gamma(&image, 1.3, 1.0)
        );
    }

    #[test]
    fn contrast_stretches_about_mid_gray() {
        let image = gradient();
        let output = apply_contrast_gamma(&image, 1.5, 1.0);
        let p = |x: u32| output.get_pixel(x, 0)[0];
        assert_eq!(p(0), 0);
        assert_eq!(p(255), 255);
        assert_eq!(p(100), 86);
        assert_eq!(p(160), 176);
        let low = apply_contrast_gamma(&image, 0.6, 1.0);
        assert_eq!(low.get_pixel(0, 0)[0], 51);
        assert_eq!(low.get_pixel(255, 0)[0], 204);
    }

    #[test]
    fn gamma_brightens_midtones() {
        let image = gradient();
        let output = apply_contrast_gamma(&image, 1.0, 1.4);
        assert_eq!(output.get_pixel(0, 0)[0], 0);
        assert_eq!(output.get_pixel(255, 0)[0], 255);
        assert!(output.get_pixel(128, 0)[0] > 128);
        let darker = apply_contrast_gamma(&image, 1.0, 0.8);
        assert!(darker.get_pixel(128, 0)[0] < 128);
    }

    #[test]
    fn contrast_comes_before_gamma() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([64, 64, 64, 255]));
        let output = apply_contrast_gamma(&image, 0.5, 2.0);
        // (64 - 127.5)·0.5 + 127.5 = 95.75, then 255·(95.75/255)^0.5
        let expected = (255.0 * (95.75f64 / 255.0).sqrt()).round() as u8;
        assert_eq!(output.get_pixel(0, 0)[0], expected);
    }

    #[test]
    fn alpha_is_untouched() {
        let image = gradient();
        let output = apply_contrast_gamma(&image, 1.4, 0.9);
        output
            .pixels()
            .zip(image.pixels())
            .for_each(|(o, i)| assert_eq!(o[3], i[3]));
    }
}
