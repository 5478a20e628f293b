//! Continuation chart pattern detectors
//!
//! Patterns: Ascending/Descending/Symmetrical Triangle, Bull/Bear Flag and the
//! converging-trendline Rising/Falling Wedge (reported as reversals).

use std::collections::HashMap;

use super::extrema::{Extremum, ExtremumKind, Swings};
use super::helpers::{keep_recent, linear_slope, relative_diff, window};
use crate::params::{get_period, get_ratio, ParamMeta, ParameterizedDetector};
use crate::{
    Direction, MatchDraft, PatternCategory, PatternDetails, PatternDetector, PatternError,
    PatternId, PatternMatch, Period, Ratio, Result, SeriesContext, OHLCV,
};

impl_with_defaults!(
    AscendingTriangleDetector,
    DescendingTriangleDetector,
    SymmetricalTriangleDetector,
    BullFlagDetector,
    BearFlagDetector,
    RisingWedgeDetector,
    FallingWedgeDetector,
);

const FLAT_TRIANGLE_CONFIDENCE: f64 = 0.65;
const SYMMETRICAL_CONFIDENCE: f64 = 0.6;
const WEDGE_CONFIDENCE: f64 = 0.6;
const FLAG_CONFIDENCE: f64 = 0.65;
/// Shortest flag that still yields a meaningful regression
const MIN_FLAG_BARS: usize = 6;

// ============================================================
// FLAT-SIDED TRIANGLES
// ============================================================

/// Flat side on `flat_kind` swings, converging side on the opposite kind.
fn flat_triangle<T: OHLCV>(
    bars: &[T],
    swings: &Swings,
    flat_kind: ExtremumKind,
    tolerance: f64,
    pattern_id: PatternId,
    direction: Direction,
) -> Vec<PatternMatch> {
    let (flat, sloped) = match flat_kind {
        ExtremumKind::Peak => (&swings.peaks, &swings.troughs),
        ExtremumKind::Trough => (&swings.troughs, &swings.peaks),
    };
    if flat.len() < 2 || sloped.len() < 2 {
        return Vec::new();
    }

    let mut out = Vec::new();
    for pair in flat.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if !relative_diff(b.price, a.price).is_some_and(|d| d < tolerance) {
            continue;
        }
        let Some(inside) = sloped.iter().find(|s| a.index < s.index && s.index < b.index) else {
            continue;
        };
        let Some(before) = sloped.iter().rev().find(|s| s.index < a.index) else {
            continue;
        };
        // Rising lows under flat resistance, falling highs over flat support
        let converging = match flat_kind {
            ExtremumKind::Peak => inside.price > before.price,
            ExtremumKind::Trough => inside.price < before.price,
        };
        if !converging {
            continue;
        }

        let draft = MatchDraft {
            pattern_id,
            category: PatternCategory::Continuation,
            direction,
            start_index: before.index,
            end_index: b.index,
            confidence: FLAT_TRIANGLE_CONFIDENCE,
            details: PatternDetails::Triangle {
                flat_level: (a.price + b.price) / 2.0,
                sloped_start: before.price,
                sloped_end: inside.price,
            },
        };
        out.extend(draft.finish(bars));
    }
    out
}

/// Ascending Triangle - flat resistance with rising support
#[derive(Debug, Clone, Copy)]
pub struct AscendingTriangleDetector {
    /// Maximum relative difference between the two resistance peaks
    pub flat_tolerance: Ratio,
}

impl Default for AscendingTriangleDetector {
    fn default() -> Self {
        Self {
            flat_tolerance: Ratio::new_const(0.02),
        }
    }
}

impl PatternDetector for AscendingTriangleDetector {
    fn id(&self) -> PatternId {
        PatternId::ASCENDING_TRIANGLE
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Continuation
    }

    fn min_bars(&self) -> usize {
        11
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        Ok(flat_triangle(
            bars,
            &ctx.swings,
            ExtremumKind::Peak,
            self.flat_tolerance.get(),
            PatternId::ASCENDING_TRIANGLE,
            Direction::Bullish,
        ))
    }
}

/// Descending Triangle - flat support with falling resistance
#[derive(Debug, Clone, Copy)]
pub struct DescendingTriangleDetector {
    pub flat_tolerance: Ratio,
}

impl Default for DescendingTriangleDetector {
    fn default() -> Self {
        Self {
            flat_tolerance: Ratio::new_const(0.02),
        }
    }
}

impl PatternDetector for DescendingTriangleDetector {
    fn id(&self) -> PatternId {
        PatternId::DESCENDING_TRIANGLE
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Continuation
    }

    fn min_bars(&self) -> usize {
        11
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        Ok(flat_triangle(
            bars,
            &ctx.swings,
            ExtremumKind::Trough,
            self.flat_tolerance.get(),
            PatternId::DESCENDING_TRIANGLE,
            Direction::Bearish,
        ))
    }
}

// ============================================================
// CONVERGING TRENDLINES
// ============================================================

/// Consecutive peak pair and trough pair, with both trendline slopes
struct Trendlines {
    p1: Extremum,
    p2: Extremum,
    t1: Extremum,
    t2: Extremum,
    upper_slope: f64,
    lower_slope: f64,
}

impl Trendlines {
    /// Troughs lead: t1 < p1 < t2 < p2
    fn trough_led(&self) -> bool {
        self.t1.index < self.p1.index && self.p1.index < self.t2.index && self.t2.index < self.p2.index
    }

    /// Peaks lead: p1 < t1 < p2 < t2
    fn peak_led(&self) -> bool {
        self.p1.index < self.t1.index && self.t1.index < self.p2.index && self.p2.index < self.t2.index
    }

    fn span(&self) -> (usize, usize) {
        (
            self.p1.index.min(self.t1.index),
            self.p2.index.max(self.t2.index),
        )
    }
}

fn slope_between(a: Extremum, b: Extremum) -> Option<f64> {
    (b.index > a.index).then(|| (b.price - a.price) / (b.index - a.index) as f64)
}

fn trendlines(swings: &Swings) -> impl Iterator<Item = Trendlines> + '_ {
    swings.peaks.windows(2).flat_map(move |p| {
        swings.troughs.windows(2).filter_map(move |t| {
            let (p1, p2, t1, t2) = (p[0], p[1], t[0], t[1]);
            Some(Trendlines {
                p1,
                p2,
                t1,
                t2,
                upper_slope: slope_between(p1, p2)?,
                lower_slope: slope_between(t1, t2)?,
            })
        })
    })
}

fn converging_draft(
    lines: &Trendlines,
    (start_index, end_index): (usize, usize),
    pattern_id: PatternId,
    category: PatternCategory,
    direction: Direction,
    confidence: f64,
) -> MatchDraft {
    MatchDraft {
        pattern_id,
        category,
        direction,
        start_index,
        end_index,
        confidence,
        details: PatternDetails::Converging {
            upper_slope: lines.upper_slope,
            lower_slope: lines.lower_slope,
        },
    }
}

/// Symmetrical Triangle - falling highs and rising lows, interleaved
#[derive(Debug, Clone, Copy, Default)]
pub struct SymmetricalTriangleDetector;

impl PatternDetector for SymmetricalTriangleDetector {
    fn id(&self) -> PatternId {
        PatternId::SYMMETRICAL_TRIANGLE
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Continuation
    }

    fn min_bars(&self) -> usize {
        15
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        Ok(trendlines(&ctx.swings)
            .filter(|l| l.trough_led() || l.peak_led())
            .filter(|l| l.upper_slope < 0.0 && l.lower_slope > 0.0)
            .filter_map(|l| {
                converging_draft(
                    &l,
                    l.span(),
                    PatternId::SYMMETRICAL_TRIANGLE,
                    PatternCategory::Continuation,
                    Direction::Neutral,
                    SYMMETRICAL_CONFIDENCE,
                )
                .finish(bars)
            })
            .collect())
    }
}

/// Rising Wedge - both trendlines rising, support steeper than resistance
#[derive(Debug, Clone, Copy, Default)]
pub struct RisingWedgeDetector;

impl PatternDetector for RisingWedgeDetector {
    fn id(&self) -> PatternId {
        PatternId::RISING_WEDGE
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Reversal
    }

    fn min_bars(&self) -> usize {
        15
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        Ok(trendlines(&ctx.swings)
            .filter(Trendlines::trough_led)
            .filter(|l| l.upper_slope > 0.0 && l.lower_slope > 0.0 && l.lower_slope > l.upper_slope)
            .filter_map(|l| {
                converging_draft(
                    &l,
                    (l.t1.index, l.p2.index),
                    PatternId::RISING_WEDGE,
                    PatternCategory::Reversal,
                    Direction::Bearish,
                    WEDGE_CONFIDENCE,
                )
                .finish(bars)
            })
            .collect())
    }
}

/// Falling Wedge - both trendlines falling, resistance steeper than support
#[derive(Debug, Clone, Copy, Default)]
pub struct FallingWedgeDetector;

impl PatternDetector for FallingWedgeDetector {
    fn id(&self) -> PatternId {
        PatternId::FALLING_WEDGE
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Reversal
    }

    fn min_bars(&self) -> usize {
        15
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        Ok(trendlines(&ctx.swings)
            .filter(Trendlines::trough_led)
            .filter(|l| l.upper_slope < 0.0 && l.lower_slope < 0.0 && l.upper_slope < l.lower_slope)
            .filter_map(|l| {
                converging_draft(
                    &l,
                    (l.t1.index, l.p2.index),
                    PatternId::FALLING_WEDGE,
                    PatternCategory::Reversal,
                    Direction::Bullish,
                    WEDGE_CONFIDENCE,
                )
                .finish(bars)
            })
            .collect())
    }
}

// ============================================================
// FLAGS
// ============================================================

#[derive(Debug, Clone, Copy)]
struct FlagShape {
    pole_length: usize,
    flag_length: usize,
    min_pole_move: f64,
    /// Open interval the flag's regression slope must fall in
    slope_band: (f64, f64),
    recent_limit: usize,
}

fn flags<T: OHLCV>(
    bars: &[T],
    shape: FlagShape,
    pattern_id: PatternId,
    direction: Direction,
) -> Result<Vec<PatternMatch>> {
    let len = bars.len();
    if len < shape.pole_length + shape.flag_length + 1 {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for pole_end in shape.pole_length..len - shape.flag_length {
        let pole_start = pole_end - shape.pole_length;
        let start_close = bars[pole_start].close();
        let end_close = bars[pole_end].close();
        if !(start_close > 0.0) {
            continue;
        }

        let change = (end_close - start_close) / start_close;
        let pole_move = match direction {
            Direction::Bearish => -change,
            _ => change,
        };
        if !(pole_move >= shape.min_pole_move) {
            continue;
        }

        let flag_end = pole_end + shape.flag_length;
        let flag = window(bars, pole_end..flag_end)?;
        let closes: Vec<f64> = flag.iter().map(|b| b.close()).collect();
        let slope = linear_slope(&closes);
        let (min_slope, max_slope) = shape.slope_band;
        if !(slope > min_slope && slope < max_slope) {
            continue;
        }

        let draft = MatchDraft {
            pattern_id,
            category: PatternCategory::Continuation,
            direction,
            start_index: pole_start,
            end_index: flag_end,
            confidence: FLAG_CONFIDENCE,
            details: PatternDetails::Flag {
                pole_start: start_close,
                pole_end: end_close,
                flag_high: flag.iter().map(|b| b.high()).fold(f64::NEG_INFINITY, f64::max),
                flag_low: flag.iter().map(|b| b.low()).fold(f64::INFINITY, f64::min),
            },
        };
        out.extend(draft.finish(bars));
    }

    keep_recent(&mut out, shape.recent_limit);
    Ok(out)
}

fn validate_flag(flag_length: Period, slope_band: (f64, f64)) -> Result<()> {
    if flag_length.get() < MIN_FLAG_BARS {
        return Err(PatternError::OutOfRange {
            field: "flag_length",
            value: flag_length.get() as f64,
            min: MIN_FLAG_BARS as f64,
            max: f64::INFINITY,
        });
    }
    if !(slope_band.0 < slope_band.1) {
        return Err(PatternError::InvalidConfig(format!(
            "flag slope band ({}, {}) is empty",
            slope_band.0, slope_band.1
        )));
    }
    Ok(())
}

/// Bull Flag - sharp rise followed by a flat or slightly falling channel
#[derive(Debug, Clone, Copy)]
pub struct BullFlagDetector {
    pub pole_length: Period,
    pub flag_length: Period,
    /// Minimum fractional close-to-close move over the pole
    pub min_pole_move: Ratio,
    pub slope_band: (f64, f64),
    /// Number of most recent occurrences reported
    pub recent_limit: Period,
}

impl Default for BullFlagDetector {
    fn default() -> Self {
        Self {
            pole_length: Period::new_const(20),
            flag_length: Period::new_const(10),
            min_pole_move: Ratio::new_const(0.10),
            slope_band: (-0.01, 0.005),
            recent_limit: Period::new_const(3),
        }
    }
}

impl BullFlagDetector {
    fn shape(&self) -> FlagShape {
        FlagShape {
            pole_length: self.pole_length.get(),
            flag_length: self.flag_length.get(),
            min_pole_move: self.min_pole_move.get(),
            slope_band: self.slope_band,
            recent_limit: self.recent_limit.get(),
        }
    }
}

impl PatternDetector for BullFlagDetector {
    fn id(&self) -> PatternId {
        PatternId::BULL_FLAG
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Continuation
    }

    fn min_bars(&self) -> usize {
        self.pole_length.get() + self.flag_length.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        flags(bars, self.shape(), PatternId::BULL_FLAG, Direction::Bullish)
    }

    fn validate_config(&self) -> Result<()> {
        validate_flag(self.flag_length, self.slope_band)
    }
}

/// Bear Flag - sharp drop followed by a flat or slightly rising channel
#[derive(Debug, Clone, Copy)]
pub struct BearFlagDetector {
    pub pole_length: Period,
    pub flag_length: Period,
    pub min_pole_move: Ratio,
    pub slope_band: (f64, f64),
    pub recent_limit: Period,
}

impl Default for BearFlagDetector {
    fn default() -> Self {
        Self {
            pole_length: Period::new_const(20),
            flag_length: Period::new_const(10),
            min_pole_move: Ratio::new_const(0.10),
            slope_band: (-0.005, 0.01),
            recent_limit: Period::new_const(3),
        }
    }
}

impl BearFlagDetector {
    fn shape(&self) -> FlagShape {
        FlagShape {
            pole_length: self.pole_length.get(),
            flag_length: self.flag_length.get(),
            min_pole_move: self.min_pole_move.get(),
            slope_band: self.slope_band,
            recent_limit: self.recent_limit.get(),
        }
    }
}

impl PatternDetector for BearFlagDetector {
    fn id(&self) -> PatternId {
        PatternId::BEAR_FLAG
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Continuation
    }

    fn min_bars(&self) -> usize {
        self.pole_length.get() + self.flag_length.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        flags(bars, self.shape(), PatternId::BEAR_FLAG, Direction::Bearish)
    }

    fn validate_config(&self) -> Result<()> {
        validate_flag(self.flag_length, self.slope_band)
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATIONS
// ============================================================

static FLAT_TRIANGLE_PARAMS: &[ParamMeta] = &[ParamMeta::ratio(
  "flat_tolerance",
  0.02,
  (0.01, 0.04, 0.01),
  "Maximum relative difference along the flat side",
)];

static FLAG_PARAMS: &[ParamMeta] = &[
  ParamMeta::period("pole_length", 20.0, (10.0, 30.0, 5.0), "Bars in the pole"),
  ParamMeta::period("flag_length", 10.0, (6.0, 15.0, 1.0), "Bars in the consolidation"),
  ParamMeta::ratio("min_pole_move", 0.10, (0.05, 0.20, 0.05), "Minimum pole move"),
  ParamMeta::period("recent_limit", 3.0, (1.0, 10.0, 1.0), "Most recent occurrences reported"),
];

impl ParameterizedDetector for AscendingTriangleDetector {
  fn param_meta() -> &'static [ParamMeta] {
    FLAT_TRIANGLE_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self { flat_tolerance: get_ratio(params, "flat_tolerance", 0.02)? })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::ASCENDING_TRIANGLE.as_str()
  }
}

impl ParameterizedDetector for DescendingTriangleDetector {
  fn param_meta() -> &'static [ParamMeta] {
    FLAT_TRIANGLE_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self { flat_tolerance: get_ratio(params, "flat_tolerance", 0.02)? })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::DESCENDING_TRIANGLE.as_str()
  }
}

impl ParameterizedDetector for BullFlagDetector {
  fn param_meta() -> &'static [ParamMeta] {
    FLAG_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      pole_length:   get_period(params, "pole_length", 20)?,
      flag_length:   get_period(params, "flag_length", 10)?,
      min_pole_move: get_ratio(params, "min_pole_move", 0.10)?,
      recent_limit:  get_period(params, "recent_limit", 3)?,
      ..Self::default()
    })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::BULL_FLAG.as_str()
  }
}

impl ParameterizedDetector for BearFlagDetector {
  fn param_meta() -> &'static [ParamMeta] {
    FLAG_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      pole_length:   get_period(params, "pole_length", 20)?,
      flag_length:   get_period(params, "flag_length", 10)?,
      min_pole_move: get_ratio(params, "min_pole_move", 0.10)?,
      recent_limit:  get_period(params, "recent_limit", 3)?,
      ..Self::default()
    })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::BEAR_FLAG.as_str()
  }
}
