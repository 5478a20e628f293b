//! Common helper functions for chart pattern detection
//!
//! Tolerance comparisons, trendline slopes, percentiles and bounded window
//! scans shared across all detector modules.

use std::ops::Range;

use crate::{PatternError, Result, OHLCV};

// ============================================================
// THRESHOLDS
// ============================================================

/// Denominator below which a regression is treated as flat
pub const SLOPE_EPSILON: f64 = 1e-10;

// ============================================================
// COMPARISONS
// ============================================================

/// `|value - reference| / reference`, or `None` when the reference is not a
/// positive finite price.
#[inline]
pub fn relative_diff(value: f64, reference: f64) -> Option<f64> {
    if !(reference > 0.0) || !reference.is_finite() || !value.is_finite() {
        return None;
    }
    Some((value - reference).abs() / reference)
}

/// True when `value` lies strictly within `tolerance` of `reference`.
#[inline]
pub fn within_tolerance(value: f64, reference: f64, tolerance: f64) -> bool {
    relative_diff(value, reference).is_some_and(|d| d < tolerance)
}

/// Measured-move target: the extreme reflected through the breakout level.
///
/// Tops project downwards and bottoms upwards with the same formula.
#[inline]
pub fn measured_move(extreme: f64, breakout: f64) -> f64 {
    breakout - (extreme - breakout)
}

/// Clamp to [0, 1] and round to two decimals
#[inline]
pub fn round_confidence(confidence: f64) -> f64 {
    (confidence.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

// ============================================================
// REGRESSION / STATISTICS
// ============================================================

/// Least-squares slope of `values` against their index.
///
/// Returns 0.0 for fewer than two points or a degenerate denominator.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let sum_x: f64 = (0..n).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..n).map(|i| (i * i) as f64).sum();

    let denominator = n_f * sum_x2 - sum_x * sum_x;
    if denominator.abs() < SLOPE_EPSILON {
        return 0.0;
    }
    (n_f * sum_xy - sum_x * sum_y) / denominator
}

/// Quantile with linear interpolation between closest ranks.
///
/// Non-finite values are ignored. `None` for an empty input or `q` outside [0, 1].
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

// ============================================================
// WINDOWS
// ============================================================

/// Non-empty, in-bounds sub-slice `bars[range]`
#[inline]
pub fn window<T>(bars: &[T], range: Range<usize>) -> Result<&[T]> {
    if range.start >= range.end || range.end > bars.len() {
        return Err(PatternError::WindowOutOfBounds {
            start: range.start,
            end: range.end,
            len: bars.len(),
        });
    }
    Ok(&bars[range])
}

/// Lowest low over `bars[range]`
pub fn lowest_low<T: OHLCV>(bars: &[T], range: Range<usize>) -> Result<f64> {
    Ok(window(bars, range)?
        .iter()
        .map(|b| b.low())
        .fold(f64::INFINITY, f64::min))
}

/// Highest high over `bars[range]`
pub fn highest_high<T: OHLCV>(bars: &[T], range: Range<usize>) -> Result<f64> {
    Ok(window(bars, range)?
        .iter()
        .map(|b| b.high())
        .fold(f64::NEG_INFINITY, f64::max))
}

/// Keep only the last `limit` items, preserving order
#[inline]
pub fn keep_recent<T>(items: &mut Vec<T>, limit: usize) {
    if items.len() > limit {
        items.drain(..items.len() - limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::from_mids;

    #[test]
    fn test_relative_diff_guards_reference() {
        assert_eq!(relative_diff(101.0, 100.0), Some(0.01));
        assert_eq!(relative_diff(1.0, 0.0), None);
        assert_eq!(relative_diff(1.0, -5.0), None);
        assert_eq!(relative_diff(f64::NAN, 5.0), None);
        assert!(within_tolerance(102.9, 100.0, 0.03));
        assert!(!within_tolerance(103.0, 100.0, 0.03));
    }

    #[test]
    fn test_measured_move_both_directions() {
        assert_eq!(measured_move(100.0, 90.0), 80.0);
        assert_eq!(measured_move(80.0, 90.0), 100.0);
    }

    #[test]
    fn test_round_confidence() {
        assert_eq!(round_confidence(0.7549), 0.75);
        assert_eq!(round_confidence(1.3), 1.0);
        assert_eq!(round_confidence(-0.2), 0.0);
    }

    #[test]
    fn test_linear_slope() {
        assert!((linear_slope(&[1.0, 2.0, 3.0, 4.0]) - 1.0).abs() < 1e-12);
        assert!((linear_slope(&[5.0, 3.0, 1.0]) + 2.0).abs() < 1e-12);
        assert_eq!(linear_slope(&[7.0]), 0.0);
        assert_eq!(linear_slope(&[]), 0.0);
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 1.0), Some(5.0));
        assert_eq!(percentile(&values, 0.5), Some(3.0));
        assert!((percentile(&values, 0.95).unwrap() - 4.8).abs() < 1e-12);
        assert_eq!(percentile(&[], 0.5), None);
        assert_eq!(percentile(&values, 1.5), None);
    }

    #[test]
    fn test_window_bounds() {
        let bars = from_mids(&[10.0, 12.0, 11.0, 9.0]);
        assert_eq!(highest_high(&bars, 0..3).unwrap(), 12.5);
        assert_eq!(lowest_low(&bars, 1..4).unwrap(), 8.5);
        assert!(window(&bars, 2..2).is_err());
        assert!(window(&bars, 3..5).is_err());
    }

    #[test]
    fn test_keep_recent() {
        let mut v = vec![1, 2, 3, 4, 5];
        keep_recent(&mut v, 3);
        assert_eq!(v, vec![3, 4, 5]);
        keep_recent(&mut v, 10);
        assert_eq!(v.len(), 3);
    }
}
