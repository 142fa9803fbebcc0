//! Percentile helpers
//!
//! Two different tools live here:
//! - [`estimate_percentile`] places a single value against stored p25/p50/p75
//!   anchors. It is a compatibility estimator, not an empirical CDF.
//! - [`quantile`] computes a quantile of a full sorted sample with linear
//!   interpolation between the neighbouring ranks; the aggregator uses it to
//!   produce the anchors in the first place.

/// Estimate the percentile rank (0-99) of `value` against three anchors.
///
/// Breakpoints are 0/25/50/75 with linear interpolation between anchors and
/// proportional extrapolation above p75. Degenerate (equal or zero) anchors
/// resolve to the upper breakpoint of the segment.
pub fn estimate_percentile(value: f64, p25: f64, p50: f64, p75: f64) -> u8 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }

    let estimate = if value <= p25 {
        if p25 == 0.0 {
            25.0
        } else {
            (value / p25) * 25.0
        }
    } else if value <= p50 {
        if p50 == p25 {
            50.0
        } else {
            25.0 + ((value - p25) / (p50 - p25)) * 25.0
        }
    } else if value <= p75 {
        if p75 == p50 {
            75.0
        } else {
            50.0 + ((value - p50) / (p75 - p50)) * 25.0
        }
    } else if p75 == 0.0 {
        99.0
    } else {
        75.0 + ((value - p75) / p75) * 25.0
    };

    estimate.round().clamp(0.0, 99.0) as u8
}

/// Quantile `q` (0-1) of an ascending sample, interpolating between ranks.
///
/// Returns 0.0 for an empty sample.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let q = q.clamp(0.0, 1.0);
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// p25, p50 and p75 of an unsorted sample
pub fn quartiles(values: &[f64]) -> (f64, f64, f64) {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    (
        quantile(&sorted, 0.25),
        quantile(&sorted, 0.50),
        quantile(&sorted, 0.75),
    )
}

/// Round to two decimals for published figures
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_value_is_zero_for_any_anchors() {
        assert_eq!(estimate_percentile(0.0, 5.0, 10.0, 20.0), 0);
        assert_eq!(estimate_percentile(0.0, 0.0, 0.0, 0.0), 0);
        assert_eq!(estimate_percentile(-3.0, 1.0, 2.0, 3.0), 0);
        assert_eq!(estimate_percentile(f64::NAN, 1.0, 2.0, 3.0), 0);
    }

    #[test]
    fn test_anchor_values_hit_breakpoints_exactly() {
        assert_eq!(estimate_percentile(5.0, 5.0, 10.0, 20.0), 25);
        assert_eq!(estimate_percentile(10.0, 5.0, 10.0, 20.0), 50);
        assert_eq!(estimate_percentile(20.0, 5.0, 10.0, 20.0), 75);
    }

    #[test]
    fn test_interpolation_within_segments() {
        // 2.5 / 5 * 25
        assert_eq!(estimate_percentile(2.5, 5.0, 10.0, 20.0), 13);
        // 25 + (7.5 - 5) / 5 * 25
        assert_eq!(estimate_percentile(7.5, 5.0, 10.0, 20.0), 38);
        // 50 + (15 - 10) / 10 * 25
        assert_eq!(estimate_percentile(15.0, 5.0, 10.0, 20.0), 63);
    }

    #[test]
    fn test_extrapolation_above_p75_is_capped() {
        // 75 + (30 - 20) / 20 * 25
        assert_eq!(estimate_percentile(30.0, 5.0, 10.0, 20.0), 88);
        assert_eq!(estimate_percentile(200.0, 5.0, 10.0, 20.0), 99);
    }

    #[test]
    fn test_degenerate_anchors() {
        assert_eq!(estimate_percentile(1.0, 0.0, 0.0, 0.0), 99);
        assert_eq!(estimate_percentile(3.0, 3.0, 3.0, 3.0), 25);
        assert_eq!(estimate_percentile(4.0, 3.0, 4.0, 4.0), 50);
        assert_eq!(estimate_percentile(2.0, 0.0, 2.0, 5.0), 50);
        assert_eq!(estimate_percentile(0.5, 0.0, 2.0, 5.0), 31);
    }

    #[test]
    fn test_quantile_interpolates_between_ranks() {
        let sorted = [0.0, 0.0, 2.0, 4.0, 10.0];
        assert_eq!(quantile(&sorted, 0.0), 0.0);
        assert_eq!(quantile(&sorted, 0.5), 2.0);
        assert_eq!(quantile(&sorted, 1.0), 10.0);
        // position 3 * 0.25 = 0.75 on [1, 2, 3, 4]
        assert!((quantile(&[1.0, 2.0, 3.0, 4.0], 0.25) - 1.75).abs() < 1e-9);
        assert_eq!(quantile(&[], 0.5), 0.0);
        assert_eq!(quantile(&[7.0], 0.75), 7.0);
    }

    #[test]
    fn test_quartiles_sorts_input() {
        let (p25, p50, p75) = quartiles(&[4.0, 1.0, 3.0, 2.0, 5.0]);
        assert_eq!((p25, p50, p75), (2.0, 3.0, 4.0));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(33.333_333), 33.33);
        assert_eq!(round2(2.675_1), 2.68);
        assert_eq!(round2(0.0), 0.0);
        assert_eq!(round2(4.0), 4.0);
    }
}
