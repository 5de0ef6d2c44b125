//! sRGB transfer functions

/// Display encoded value to linear light
#[inline]
pub fn to_linear(u: f64) -> f64 {
    if u <= 0.04045 {
        u / 12.92
    } else {
        ((u + 0.055) / 1.055).powf(2.4)
    }
}

/// Linear light to display encoded value
#[inline]
pub fn from_linear(u: f64) -> f64 {
    if u <= 0.0031308 {
        12.92 * u
    } else {
        1.055 * u.powf(1.0 / 2.4) - 0.055
    }
}

/// 8 bit display value to linear light
pub fn u8_to_linear(value: u8) -> f64 {
    to_linear(value as f64 / 255.0)
}

/// Linear light to 8 bit display value, clipped to the displayable range
pub fn linear_to_u8(value: f64) -> u8 {
    (from_linear(value.clamp(0.0, 1.0)).clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_8bit_value_round_trips() {
        for v in 0..=255u8 {
            assert_eq!(linear_to_u8(u8_to_linear(v)), v);
        }
    }

    #[test]
    fn transfer_is_monotonic_and_continuous() {
        let mut previous = -1.0;
        for i in 0..=1000 {
            let l = to_linear(i as f64 / 1000.0);
            assert!(l > previous);
            previous = l;
        }
        assert!((to_linear(0.04045) - ((0.04045 + 0.055) / 1.055f64).powf(2.4)).abs() < 1e-6);
        assert!((from_linear(to_linear(0.5)) - 0.5).abs() < 1e-12);
        assert!((u8_to_linear(128) - 0.21586).abs() < 1e-4);
    }

    #[test]
    fn out_of_range_is_clipped() {
        assert_eq!(linear_to_u8(-0.5), 0);
        assert_eq!(linear_to_u8(3.0), 255);
    }
}
