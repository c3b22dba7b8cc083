//! Ratio and rounding helpers shared by the aggregators.
//!
//! Every ratio is 0 when its denominator is 0, and nothing non-finite is
//! ever returned.

/// `part / whole × 100`, rounded to 2 decimals
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_to(part as f64 / whole as f64 * 100.0, 2)
}

/// Plain ratio, unrounded
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let value = numerator / denominator;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

pub fn round_to(value: f64, places: u32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_denominators() {
        assert_eq!(percentage(5, 0), 0.0);
        assert_eq!(ratio(5.0, 0.0), 0.0);
        assert_eq!(round_to(f64::NAN, 2), 0.0);
        assert_eq!(round_to(f64::INFINITY, 2), 0.0);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(round_to(0.87654, 3), 0.877);
        assert_eq!(round_to(12.25, 1), 12.3);
    }
}
