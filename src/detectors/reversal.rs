//! Reversal chart pattern detectors
//!
//! Patterns: Head and Shoulders, Inverse Head and Shoulders, Double Top,
//! Double Bottom, Triple Top, Triple Bottom.
//!
//! Each top/bottom pair shares one implementation parameterized by the swing
//! kind it is built from: peaks for tops, troughs for bottoms.

use std::collections::HashMap;

use super::extrema::{Extremum, ExtremumKind};
use super::helpers::{highest_high, lowest_low, measured_move, relative_diff, within_tolerance};
use crate::params::{get_ratio, ParamMeta, ParameterizedDetector};
use crate::{
    Direction, MatchDraft, PatternCategory, PatternDetails, PatternDetector, PatternId,
    PatternMatch, Ratio, Result, SeriesContext, OHLCV,
};

impl_with_defaults!(
    HeadAndShouldersDetector,
    InverseHeadAndShouldersDetector,
    DoubleTopDetector,
    DoubleBottomDetector,
    TripleTopDetector,
    TripleBottomDetector,
);

const HS_BASE_CONFIDENCE: f64 = 0.8;
const HS_ASYMMETRY_PENALTY: f64 = 2.0;
const DOUBLE_BASE_CONFIDENCE: f64 = 0.75;
const DOUBLE_MISMATCH_PENALTY: f64 = 5.0;
const TRIPLE_CONFIDENCE: f64 = 0.7;

/// Breakout level between two swings: the lowest low under peaks, the highest
/// high over troughs, scanned over `[from, to)`.
fn breakout_between<T: OHLCV>(bars: &[T], kind: ExtremumKind, from: usize, to: usize) -> Result<f64> {
    match kind {
        ExtremumKind::Peak => lowest_low(bars, from..to),
        ExtremumKind::Trough => highest_high(bars, from..to),
    }
}

/// True when `a` is more extreme than `b` in the direction of `kind`
#[inline]
fn dominates(kind: ExtremumKind, a: f64, b: f64) -> bool {
    match kind {
        ExtremumKind::Peak => a > b,
        ExtremumKind::Trough => a < b,
    }
}

// ============================================================
// HEAD AND SHOULDERS
// ============================================================

fn head_and_shoulders<T: OHLCV>(
    bars: &[T],
    points: &[Extremum],
    kind: ExtremumKind,
    tolerance: f64,
    pattern_id: PatternId,
    direction: Direction,
) -> Result<Vec<PatternMatch>> {
    let mut out = Vec::new();
    for triple in points.windows(3) {
        let (left, head, right) = (triple[0], triple[1], triple[2]);
        if !dominates(kind, head.price, left.price) || !dominates(kind, head.price, right.price) {
            continue;
        }
        let Some(asymmetry) = relative_diff(right.price, left.price) else {
            continue;
        };
        if asymmetry >= tolerance {
            continue;
        }

        let neckline = breakout_between(bars, kind, left.index, right.index)?;
        let draft = MatchDraft {
            pattern_id,
            category: PatternCategory::Reversal,
            direction,
            start_index: left.index,
            end_index: right.index,
            confidence: HS_BASE_CONFIDENCE - HS_ASYMMETRY_PENALTY * asymmetry,
            details: PatternDetails::HeadAndShoulders {
                left_shoulder: left.price,
                head: head.price,
                right_shoulder: right.price,
                neckline,
                target_price: measured_move(head.price, neckline),
            },
        };
        out.extend(draft.finish(bars));
    }
    Ok(out)
}

/// Head and Shoulders - three peaks, the middle one highest
#[derive(Debug, Clone, Copy)]
pub struct HeadAndShouldersDetector {
    /// Maximum relative difference between the two shoulders
    pub shoulder_tolerance: Ratio,
}

impl Default for HeadAndShouldersDetector {
    fn default() -> Self {
        Self {
            shoulder_tolerance: Ratio::new_const(0.05),
        }
    }
}

impl PatternDetector for HeadAndShouldersDetector {
    fn id(&self) -> PatternId {
        PatternId::HEAD_AND_SHOULDERS
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Reversal
    }

    /// Three order-3 peaks fit in no fewer than 15 bars
    fn min_bars(&self) -> usize {
        15
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        head_and_shoulders(
            bars,
            &ctx.swings.peaks,
            ExtremumKind::Peak,
            self.shoulder_tolerance.get(),
            PatternId::HEAD_AND_SHOULDERS,
            Direction::Bearish,
        )
    }
}

/// Inverse Head and Shoulders - three troughs, the middle one lowest
#[derive(Debug, Clone, Copy)]
pub struct InverseHeadAndShouldersDetector {
    pub shoulder_tolerance: Ratio,
}

impl Default for InverseHeadAndShouldersDetector {
    fn default() -> Self {
        Self {
            shoulder_tolerance: Ratio::new_const(0.05),
        }
    }
}

impl PatternDetector for InverseHeadAndShouldersDetector {
    fn id(&self) -> PatternId {
        PatternId::INVERSE_HEAD_AND_SHOULDERS
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Reversal
    }

    fn min_bars(&self) -> usize {
        15
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        head_and_shoulders(
            bars,
            &ctx.swings.troughs,
            ExtremumKind::Trough,
            self.shoulder_tolerance.get(),
            PatternId::INVERSE_HEAD_AND_SHOULDERS,
            Direction::Bullish,
        )
    }
}

// ============================================================
// DOUBLE TOP / BOTTOM
// ============================================================

fn double_extreme<T: OHLCV>(
    bars: &[T],
    points: &[Extremum],
    kind: ExtremumKind,
    tolerance: f64,
    min_pullback: f64,
    pattern_id: PatternId,
    direction: Direction,
) -> Result<Vec<PatternMatch>> {
    let mut out = Vec::new();
    for pair in points.windows(2) {
        let (first, second) = (pair[0], pair[1]);
        let Some(mismatch) = relative_diff(second.price, first.price) else {
            continue;
        };
        if mismatch >= tolerance {
            continue;
        }

        let average = (first.price + second.price) / 2.0;
        let breakout = breakout_between(bars, kind, first.index, second.index)?;
        // The pullback between the two tests has to be meaningful
        if !relative_diff(breakout, average).is_some_and(|p| p > min_pullback) {
            continue;
        }

        let draft = MatchDraft {
            pattern_id,
            category: PatternCategory::Reversal,
            direction,
            start_index: first.index,
            end_index: second.index,
            confidence: DOUBLE_BASE_CONFIDENCE - DOUBLE_MISMATCH_PENALTY * mismatch,
            details: PatternDetails::DoubleExtreme {
                first: first.price,
                second: second.price,
                breakout,
                // Projected from the first test, not the pair average
                target_price: measured_move(first.price, breakout),
            },
        };
        out.extend(draft.finish(bars));
    }
    Ok(out)
}

/// Double Top - two peaks at a similar level with a pullback between
#[derive(Debug, Clone, Copy)]
pub struct DoubleTopDetector {
    /// Maximum relative difference between the two peaks
    pub tolerance: Ratio,
    /// Minimum depth of the intervening trough relative to the peak average
    pub min_pullback: Ratio,
}

impl Default for DoubleTopDetector {
    fn default() -> Self {
        Self {
            tolerance: Ratio::new_const(0.03),
            min_pullback: Ratio::new_const(0.05),
        }
    }
}

impl PatternDetector for DoubleTopDetector {
    fn id(&self) -> PatternId {
        PatternId::DOUBLE_TOP
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Reversal
    }

    fn min_bars(&self) -> usize {
        11
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        double_extreme(
            bars,
            &ctx.swings.peaks,
            ExtremumKind::Peak,
            self.tolerance.get(),
            self.min_pullback.get(),
            PatternId::DOUBLE_TOP,
            Direction::Bearish,
        )
    }
}

/// Double Bottom - two troughs at a similar level with a rally between
#[derive(Debug, Clone, Copy)]
pub struct DoubleBottomDetector {
    pub tolerance: Ratio,
    pub min_pullback: Ratio,
}

impl Default for DoubleBottomDetector {
    fn default() -> Self {
        Self {
            tolerance: Ratio::new_const(0.03),
            min_pullback: Ratio::new_const(0.05),
        }
    }
}

impl PatternDetector for DoubleBottomDetector {
    fn id(&self) -> PatternId {
        PatternId::DOUBLE_BOTTOM
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Reversal
    }

    fn min_bars(&self) -> usize {
        11
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        double_extreme(
            bars,
            &ctx.swings.troughs,
            ExtremumKind::Trough,
            self.tolerance.get(),
            self.min_pullback.get(),
            PatternId::DOUBLE_BOTTOM,
            Direction::Bullish,
        )
    }
}

// ============================================================
// TRIPLE TOP / BOTTOM
// ============================================================

fn triple_extreme<T: OHLCV>(
    bars: &[T],
    points: &[Extremum],
    kind: ExtremumKind,
    tolerance: f64,
    pattern_id: PatternId,
    direction: Direction,
) -> Result<Vec<PatternMatch>> {
    let mut out = Vec::new();
    for triple in points.windows(3) {
        let level = triple.iter().map(|p| p.price).sum::<f64>() / 3.0;
        if !triple.iter().all(|p| within_tolerance(p.price, level, tolerance)) {
            continue;
        }

        let (first, last) = (triple[0], triple[2]);
        let breakout = breakout_between(bars, kind, first.index, last.index)?;
        let draft = MatchDraft {
            pattern_id,
            category: PatternCategory::Reversal,
            direction,
            start_index: first.index,
            end_index: last.index,
            confidence: TRIPLE_CONFIDENCE,
            details: PatternDetails::TripleExtreme {
                level,
                breakout,
                target_price: measured_move(level, breakout),
            },
        };
        out.extend(draft.finish(bars));
    }
    Ok(out)
}

/// Triple Top - three peaks near one level (uses the finer swing set)
#[derive(Debug, Clone, Copy)]
pub struct TripleTopDetector {
    /// Maximum relative distance of each peak from the mean level
    pub tolerance: Ratio,
}

impl Default for TripleTopDetector {
    fn default() -> Self {
        Self {
            tolerance: Ratio::new_const(0.03),
        }
    }
}

impl PatternDetector for TripleTopDetector {
    fn id(&self) -> PatternId {
        PatternId::TRIPLE_TOP
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Reversal
    }

    fn min_bars(&self) -> usize {
        11
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        triple_extreme(
            bars,
            &ctx.fine_swings.peaks,
            ExtremumKind::Peak,
            self.tolerance.get(),
            PatternId::TRIPLE_TOP,
            Direction::Bearish,
        )
    }
}

/// Triple Bottom - three troughs near one level
#[derive(Debug, Clone, Copy)]
pub struct TripleBottomDetector {
    pub tolerance: Ratio,
}

impl Default for TripleBottomDetector {
    fn default() -> Self {
        Self {
            tolerance: Ratio::new_const(0.03),
        }
    }
}

impl PatternDetector for TripleBottomDetector {
    fn id(&self) -> PatternId {
        PatternId::TRIPLE_BOTTOM
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Reversal
    }

    fn min_bars(&self) -> usize {
        11
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        triple_extreme(
            bars,
            &ctx.fine_swings.troughs,
            ExtremumKind::Trough,
            self.tolerance.get(),
            PatternId::TRIPLE_BOTTOM,
            Direction::Bullish,
        )
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATIONS
// ============================================================

static HEAD_AND_SHOULDERS_PARAMS: &[ParamMeta] = &[ParamMeta::ratio(
  "shoulder_tolerance",
  0.05,
  (0.02, 0.10, 0.01),
  "Maximum relative difference between shoulders",
)];

static DOUBLE_EXTREME_PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio("tolerance", 0.03, (0.01, 0.05, 0.01), "Maximum relative difference between the two extremes"),
  ParamMeta::ratio("min_pullback", 0.05, (0.03, 0.10, 0.01), "Minimum intervening pullback"),
];

static TRIPLE_EXTREME_PARAMS: &[ParamMeta] = &[ParamMeta::ratio(
  "tolerance",
  0.03,
  (0.01, 0.05, 0.01),
  "Maximum distance of each extreme from the mean level",
)];

impl ParameterizedDetector for HeadAndShouldersDetector {
  fn param_meta() -> &'static [ParamMeta] {
    HEAD_AND_SHOULDERS_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self { shoulder_tolerance: get_ratio(params, "shoulder_tolerance", 0.05)? })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::HEAD_AND_SHOULDERS.as_str()
  }
}

impl ParameterizedDetector for InverseHeadAndShouldersDetector {
  fn param_meta() -> &'static [ParamMeta] {
    HEAD_AND_SHOULDERS_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self { shoulder_tolerance: get_ratio(params, "shoulder_tolerance", 0.05)? })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::INVERSE_HEAD_AND_SHOULDERS.as_str()
  }
}

impl ParameterizedDetector for DoubleTopDetector {
  fn param_meta() -> &'static [ParamMeta] {
    DOUBLE_EXTREME_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      tolerance:    get_ratio(params, "tolerance", 0.03)?,
      min_pullback: get_ratio(params, "min_pullback", 0.05)?,
    })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::DOUBLE_TOP.as_str()
  }
}

impl ParameterizedDetector for DoubleBottomDetector {
  fn param_meta() -> &'static [ParamMeta] {
    DOUBLE_EXTREME_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      tolerance:    get_ratio(params, "tolerance", 0.03)?,
      min_pullback: get_ratio(params, "min_pullback", 0.05)?,
    })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::DOUBLE_BOTTOM.as_str()
  }
}

impl ParameterizedDetector for TripleTopDetector {
  fn param_meta() -> &'static [ParamMeta] {
    TRIPLE_EXTREME_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self { tolerance: get_ratio(params, "tolerance", 0.03)? })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::TRIPLE_TOP.as_str()
  }
}

impl ParameterizedDetector for TripleBottomDetector {
  fn param_meta() -> &'static [ParamMeta] {
    TRIPLE_EXTREME_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self { tolerance: get_ratio(params, "tolerance", 0.03)? })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::TRIPLE_BOTTOM.as_str()
  }
}
