//! Candlestick pattern detectors
//!
//! Patterns: Bullish/Bearish Engulfing, Hammer, Shooting Star, Doji.
//!
//! Every detector reports only its `recent_limit` most recent matches.

use std::collections::HashMap;

use crate::params::{get_period, get_ratio, ParamMeta, ParameterizedDetector};
use crate::{
    Direction, MatchDraft, OHLCVExt, PatternCategory, PatternDetails, PatternDetector,
    PatternError, PatternId, PatternMatch, Period, Ratio, Result, SeriesContext, OHLCV,
};

impl_with_defaults!(
    BullishEngulfingDetector,
    BearishEngulfingDetector,
    HammerDetector,
    ShootingStarDetector,
    DojiDetector,
);

const ENGULFING_CONFIDENCE: f64 = 0.7;
const SHADOW_REVERSAL_CONFIDENCE: f64 = 0.65;
const DOJI_CONFIDENCE: f64 = 0.5;

fn candle_details<T: OHLCV>(bar: &T) -> PatternDetails {
    PatternDetails::Candlestick {
        body: bar.body(),
        upper_shadow: bar.upper_shadow(),
        lower_shadow: bar.lower_shadow(),
    }
}

/// Scan newest to oldest, keep the first `limit` hits, return them oldest first.
fn most_recent<F>(candidates: impl DoubleEndedIterator<Item = usize>, limit: usize, f: F) -> Vec<PatternMatch>
where
    F: FnMut(usize) -> Option<PatternMatch>,
{
    let mut out: Vec<PatternMatch> = candidates.rev().filter_map(f).take(limit).collect();
    out.reverse();
    out
}

// ============================================================
// ENGULFING
// ============================================================

fn engulfing<T: OHLCV>(bars: &[T], direction: Direction, pattern_id: PatternId, limit: usize) -> Vec<PatternMatch> {
    most_recent(1..bars.len(), limit, |i| {
        let (prev, curr) = (&bars[i - 1], &bars[i]);
        let engulfs = match direction {
            Direction::Bullish => {
                prev.is_bearish()
                    && curr.is_bullish()
                    && curr.open() < prev.close()
                    && curr.close() > prev.open()
            }
            _ => {
                prev.is_bullish()
                    && curr.is_bearish()
                    && curr.open() > prev.close()
                    && curr.close() < prev.open()
            }
        };
        if !engulfs {
            return None;
        }
        MatchDraft {
            pattern_id,
            category: PatternCategory::Candlestick,
            direction,
            start_index: i - 1,
            end_index: i,
            confidence: ENGULFING_CONFIDENCE,
            details: candle_details(curr),
        }
        .finish(bars)
    })
}

/// Bullish Engulfing - bullish body swallowing the prior bearish body
#[derive(Debug, Clone, Copy)]
pub struct BullishEngulfingDetector {
    pub recent_limit: Period,
}

impl Default for BullishEngulfingDetector {
    fn default() -> Self {
        Self {
            recent_limit: Period::new_const(5),
        }
    }
}

impl PatternDetector for BullishEngulfingDetector {
    fn id(&self) -> PatternId {
        PatternId::BULLISH_ENGULFING
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Candlestick
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        Ok(engulfing(
            bars,
            Direction::Bullish,
            PatternId::BULLISH_ENGULFING,
            self.recent_limit.get(),
        ))
    }
}

/// Bearish Engulfing - bearish body swallowing the prior bullish body
#[derive(Debug, Clone, Copy)]
pub struct BearishEngulfingDetector {
    pub recent_limit: Period,
}

impl Default for BearishEngulfingDetector {
    fn default() -> Self {
        Self {
            recent_limit: Period::new_const(5),
        }
    }
}

impl PatternDetector for BearishEngulfingDetector {
    fn id(&self) -> PatternId {
        PatternId::BEARISH_ENGULFING
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Candlestick
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        Ok(engulfing(
            bars,
            Direction::Bearish,
            PatternId::BEARISH_ENGULFING,
            self.recent_limit.get(),
        ))
    }
}

// ============================================================
// HAMMER FAMILY
// ============================================================

/// Long shadow on one side, short shadow on the other, both relative to the body
#[derive(Debug, Clone, Copy)]
struct ShadowRule {
    shadow_factor: f64,
    max_opposite_shadow: f64,
}

impl ShadowRule {
    fn matches(&self, long_shadow: f64, short_shadow: f64, body: f64) -> bool {
        long_shadow > self.shadow_factor * body && short_shadow < self.max_opposite_shadow * body
    }
}

fn validate_shadow_factor(shadow_factor: f64) -> Result<()> {
    if !shadow_factor.is_finite() || shadow_factor < 1.0 {
        return Err(PatternError::OutOfRange {
            field: "shadow_factor",
            value: shadow_factor,
            min: 1.0,
            max: f64::INFINITY,
        });
    }
    Ok(())
}

/// Hammer - lower shadow over `shadow_factor` x body, upper shadow under
/// `max_opposite_shadow` x body
#[derive(Debug, Clone, Copy)]
pub struct HammerDetector {
    pub shadow_factor: f64,
    pub max_opposite_shadow: Ratio,
    pub recent_limit: Period,
}

impl Default for HammerDetector {
    fn default() -> Self {
        Self {
            shadow_factor: 2.0,
            max_opposite_shadow: Ratio::new_const(0.3),
            recent_limit: Period::new_const(5),
        }
    }
}

impl PatternDetector for HammerDetector {
    fn id(&self) -> PatternId {
        PatternId::HAMMER
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Candlestick
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        let rule = ShadowRule {
            shadow_factor: self.shadow_factor,
            max_opposite_shadow: self.max_opposite_shadow.get(),
        };
        Ok(most_recent(0..bars.len(), self.recent_limit.get(), |i| {
            let bar = &bars[i];
            if !rule.matches(bar.lower_shadow(), bar.upper_shadow(), bar.body()) {
                return None;
            }
            MatchDraft {
                pattern_id: PatternId::HAMMER,
                category: PatternCategory::Candlestick,
                direction: Direction::Bullish,
                start_index: i,
                end_index: i,
                confidence: SHADOW_REVERSAL_CONFIDENCE,
                details: candle_details(bar),
            }
            .finish(bars)
        }))
    }

    fn validate_config(&self) -> Result<()> {
        validate_shadow_factor(self.shadow_factor)
    }
}

/// Shooting Star - mirror of the hammer on the upper shadow
#[derive(Debug, Clone, Copy)]
pub struct ShootingStarDetector {
    pub shadow_factor: f64,
    pub max_opposite_shadow: Ratio,
    pub recent_limit: Period,
}

impl Default for ShootingStarDetector {
    fn default() -> Self {
        Self {
            shadow_factor: 2.0,
            max_opposite_shadow: Ratio::new_const(0.3),
            recent_limit: Period::new_const(5),
        }
    }
}

impl PatternDetector for ShootingStarDetector {
    fn id(&self) -> PatternId {
        PatternId::SHOOTING_STAR
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Candlestick
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        let rule = ShadowRule {
            shadow_factor: self.shadow_factor,
            max_opposite_shadow: self.max_opposite_shadow.get(),
        };
        Ok(most_recent(0..bars.len(), self.recent_limit.get(), |i| {
            let bar = &bars[i];
            if !rule.matches(bar.upper_shadow(), bar.lower_shadow(), bar.body()) {
                return None;
            }
            MatchDraft {
                pattern_id: PatternId::SHOOTING_STAR,
                category: PatternCategory::Candlestick,
                direction: Direction::Bearish,
                start_index: i,
                end_index: i,
                confidence: SHADOW_REVERSAL_CONFIDENCE,
                details: candle_details(bar),
            }
            .finish(bars)
        }))
    }

    fn validate_config(&self) -> Result<()> {
        validate_shadow_factor(self.shadow_factor)
    }
}

// ============================================================
// DOJI
// ============================================================

/// Doji - body under `max_body_ratio` of a non-zero range
#[derive(Debug, Clone, Copy)]
pub struct DojiDetector {
    pub max_body_ratio: Ratio,
    pub recent_limit: Period,
}

impl Default for DojiDetector {
    fn default() -> Self {
        Self {
            max_body_ratio: Ratio::new_const(0.1),
            recent_limit: Period::new_const(5),
        }
    }
}

impl PatternDetector for DojiDetector {
    fn id(&self) -> PatternId {
        PatternId::DOJI
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Candlestick
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        let max_ratio = self.max_body_ratio.get();
        Ok(most_recent(0..bars.len(), self.recent_limit.get(), |i| {
            let bar = &bars[i];
            // Zero-range bars have no defined body ratio
            if !bar.body_ratio().is_some_and(|r| r < max_ratio) {
                return None;
            }
            MatchDraft {
                pattern_id: PatternId::DOJI,
                category: PatternCategory::Candlestick,
                direction: Direction::Neutral,
                start_index: i,
                end_index: i,
                confidence: DOJI_CONFIDENCE,
                details: candle_details(bar),
            }
            .finish(bars)
        }))
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATIONS
// ============================================================

static ENGULFING_PARAMS: &[ParamMeta] =
  &[ParamMeta::period("recent_limit", 5.0, (1.0, 10.0, 1.0), "Most recent occurrences reported")];

static SHADOW_PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio("max_opposite_shadow", 0.3, (0.1, 0.5, 0.1), "Maximum opposite shadow to body ratio"),
  ParamMeta::period("recent_limit", 5.0, (1.0, 10.0, 1.0), "Most recent occurrences reported"),
];

static DOJI_PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio("max_body_ratio", 0.1, (0.05, 0.2, 0.05), "Maximum body to range ratio"),
  ParamMeta::period("recent_limit", 5.0, (1.0, 10.0, 1.0), "Most recent occurrences reported"),
];

impl ParameterizedDetector for BullishEngulfingDetector {
  fn param_meta() -> &'static [ParamMeta] {
    ENGULFING_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self { recent_limit: get_period(params, "recent_limit", 5)? })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::BULLISH_ENGULFING.as_str()
  }
}

impl ParameterizedDetector for BearishEngulfingDetector {
  fn param_meta() -> &'static [ParamMeta] {
    ENGULFING_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self { recent_limit: get_period(params, "recent_limit", 5)? })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::BEARISH_ENGULFING.as_str()
  }
}

impl ParameterizedDetector for HammerDetector {
  fn param_meta() -> &'static [ParamMeta] {
    SHADOW_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      max_opposite_shadow: get_ratio(params, "max_opposite_shadow", 0.3)?,
      recent_limit:        get_period(params, "recent_limit", 5)?,
      ..Self::default()
    })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::HAMMER.as_str()
  }
}

impl ParameterizedDetector for ShootingStarDetector {
  fn param_meta() -> &'static [ParamMeta] {
    SHADOW_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      max_opposite_shadow: get_ratio(params, "max_opposite_shadow", 0.3)?,
      recent_limit:        get_period(params, "recent_limit", 5)?,
      ..Self::default()
    })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::SHOOTING_STAR.as_str()
  }
}

impl ParameterizedDetector for DojiDetector {
  fn param_meta() -> &'static [ParamMeta] {
    DOJI_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      max_body_ratio: get_ratio(params, "max_body_ratio", 0.1)?,
      recent_limit:   get_period(params, "recent_limit", 5)?,
    })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::DOJI.as_str()
  }
}
