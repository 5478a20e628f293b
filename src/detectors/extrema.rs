//! Swing point (local extremum) detection
//!
//! A bar is a peak when its high is strictly greater than every high within
//! `order` bars on each side; troughs mirror this on lows. Bars closer than
//! `order` to either end of the series are never extrema.

use crate::{Period, OHLCV};

/// Kind of swing point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtremumKind {
    Peak,
    Trough,
}

/// A local maximum of highs or minimum of lows
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Extremum {
    pub index: usize,
    pub price: f64,
    pub kind: ExtremumKind,
}

/// Peaks and troughs of a series, each ascending by index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Swings {
    pub peaks: Vec<Extremum>,
    pub troughs: Vec<Extremum>,
}

impl Swings {
    /// Points of one kind
    #[inline]
    pub fn of(&self, kind: ExtremumKind) -> &[Extremum] {
        match kind {
            ExtremumKind::Peak => &self.peaks,
            ExtremumKind::Trough => &self.troughs,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty() && self.troughs.is_empty()
    }
}

/// Find peaks (on highs) and troughs (on lows) with window half-width `order`.
///
/// Plateaus are not extrema, and NaN never compares as an extremum.
pub fn find_extrema<T: OHLCV>(bars: &[T], order: Period) -> Swings {
    let order = order.get();
    let len = bars.len();
    let mut swings = Swings::default();
    if len <= 2 * order {
        return swings;
    }

    for i in order..len - order {
        let neighbors = (i - order..=i + order).filter(|&j| j != i);

        let high = bars[i].high();
        if neighbors.clone().all(|j| high > bars[j].high()) {
            swings.peaks.push(Extremum {
                index: i,
                price: high,
                kind: ExtremumKind::Peak,
            });
        }

        let low = bars[i].low();
        if neighbors.clone().all(|j| low < bars[j].low()) {
            swings.troughs.push(Extremum {
                index: i,
                price: low,
                kind: ExtremumKind::Trough,
            });
        }
    }
    swings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{flat, from_mids};

    #[test]
    fn test_single_peak_and_troughs() {
        let mids = [1.0, 2.0, 3.0, 4.0, 5.0, 4.0, 3.0, 2.0, 1.0, 2.0, 3.0, 4.0];
        let swings = find_extrema(&from_mids(&mids), Period::new(3).unwrap());
        assert_eq!(swings.peaks.len(), 1);
        assert_eq!(swings.peaks[0].index, 4);
        assert_eq!(swings.peaks[0].price, 5.5);
        assert_eq!(swings.troughs.len(), 1);
        assert_eq!(swings.troughs[0].index, 8);
    }

    #[test]
    fn test_boundaries_excluded() {
        // Global max at index 1 sits inside the boundary band
        let mids = [1.0, 9.0, 2.0, 3.0, 2.0, 1.0, 2.0, 1.0];
        let swings = find_extrema(&from_mids(&mids), Period::new(3).unwrap());
        assert!(swings.peaks.iter().all(|p| p.index >= 3 && p.index < 5));
    }

    #[test]
    fn test_plateau_is_not_extremum() {
        let mids = [1.0, 2.0, 3.0, 5.0, 5.0, 3.0, 2.0, 1.0];
        let swings = find_extrema(&from_mids(&mids), Period::new(2).unwrap());
        assert!(swings.peaks.is_empty());
    }

    #[test]
    fn test_flat_and_short_series() {
        let order = Period::new(3).unwrap();
        assert!(find_extrema(&flat(40, 10.0), order).is_empty());
        assert!(find_extrema(&from_mids(&[1.0, 3.0, 1.0]), order).is_empty());
    }
}
