//! Support and resistance level detectors
//!
//! A level is a percentile of the trailing highs (resistance) or lows (support)
//! that price has touched at least `min_touches` times.

use std::collections::HashMap;

use super::extrema::ExtremumKind;
use super::helpers::{percentile, window, within_tolerance};
use crate::params::{get_period, get_ratio, ParamMeta, ParameterizedDetector};
use crate::{
    Direction, MatchDraft, PatternCategory, PatternDetails, PatternDetector, PatternId,
    PatternMatch, Period, Ratio, Result, SeriesContext, OHLCV,
};

impl_with_defaults!(ResistanceLevelDetector, SupportLevelDetector);

const LEVEL_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Copy)]
struct LevelRule {
    lookback: usize,
    quantile: f64,
    tolerance: f64,
    min_touches: usize,
}

fn level<T: OHLCV>(
    bars: &[T],
    rule: LevelRule,
    side: ExtremumKind,
    pattern_id: PatternId,
) -> Result<Vec<PatternMatch>> {
    let len = bars.len();
    if len == 0 {
        return Ok(Vec::new());
    }

    let start = len - rule.lookback.min(len);
    let prices: Vec<f64> = window(bars, start..len)?
        .iter()
        .map(|b| match side {
            ExtremumKind::Peak => b.high(),
            ExtremumKind::Trough => b.low(),
        })
        .collect();

    // Zero or negative levels cannot anchor a relative tolerance
    let Some(level) = percentile(&prices, rule.quantile).filter(|l| *l > 0.0) else {
        return Ok(Vec::new());
    };
    let touches = prices
        .iter()
        .filter(|p| within_tolerance(**p, level, rule.tolerance))
        .count();
    if touches < rule.min_touches {
        return Ok(Vec::new());
    }

    let draft = MatchDraft {
        pattern_id,
        category: PatternCategory::SupportResistance,
        direction: Direction::Neutral,
        start_index: start,
        end_index: len - 1,
        confidence: LEVEL_CONFIDENCE,
        details: PatternDetails::Level { level, touches },
    };
    Ok(draft.finish(bars).into_iter().collect())
}

/// Resistance Level - upper percentile of recent highs
#[derive(Debug, Clone, Copy)]
pub struct ResistanceLevelDetector {
    /// Trailing bars considered
    pub lookback: Period,
    pub percentile: Ratio,
    /// Relative distance within which a high counts as a touch
    pub tolerance: Ratio,
    pub min_touches: Period,
}

impl Default for ResistanceLevelDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(50),
            percentile: Ratio::new_const(0.95),
            tolerance: Ratio::new_const(0.02),
            min_touches: Period::new_const(2),
        }
    }
}

impl PatternDetector for ResistanceLevelDetector {
    fn id(&self) -> PatternId {
        PatternId::RESISTANCE_LEVEL
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::SupportResistance
    }

    fn min_bars(&self) -> usize {
        self.min_touches.get()
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        let rule = LevelRule {
            lookback: self.lookback.get(),
            quantile: self.percentile.get(),
            tolerance: self.tolerance.get(),
            min_touches: self.min_touches.get(),
        };
        level(bars, rule, ExtremumKind::Peak, PatternId::RESISTANCE_LEVEL)
    }
}

/// Support Level - lower percentile of recent lows
#[derive(Debug, Clone, Copy)]
pub struct SupportLevelDetector {
    pub lookback: Period,
    pub percentile: Ratio,
    pub tolerance: Ratio,
    pub min_touches: Period,
}

impl Default for SupportLevelDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(50),
            percentile: Ratio::new_const(0.05),
            tolerance: Ratio::new_const(0.02),
            min_touches: Period::new_const(2),
        }
    }
}

impl PatternDetector for SupportLevelDetector {
    fn id(&self) -> PatternId {
        PatternId::SUPPORT_LEVEL
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::SupportResistance
    }

    fn min_bars(&self) -> usize {
        self.min_touches.get()
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        let rule = LevelRule {
            lookback: self.lookback.get(),
            quantile: self.percentile.get(),
            tolerance: self.tolerance.get(),
            min_touches: self.min_touches.get(),
        };
        level(bars, rule, ExtremumKind::Trough, PatternId::SUPPORT_LEVEL)
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATIONS
// ============================================================

static RESISTANCE_PARAMS: &[ParamMeta] = &[
  ParamMeta::period("lookback", 50.0, (20.0, 100.0, 10.0), "Trailing bars considered"),
  ParamMeta::ratio("percentile", 0.95, (0.85, 0.99, 0.02), "Quantile of highs used as the level"),
  ParamMeta::ratio("tolerance", 0.02, (0.01, 0.05, 0.01), "Touch tolerance"),
  ParamMeta::period("min_touches", 2.0, (2.0, 5.0, 1.0), "Minimum touches"),
];

static SUPPORT_PARAMS: &[ParamMeta] = &[
  ParamMeta::period("lookback", 50.0, (20.0, 100.0, 10.0), "Trailing bars considered"),
  ParamMeta::ratio("percentile", 0.05, (0.01, 0.15, 0.02), "Quantile of lows used as the level"),
  ParamMeta::ratio("tolerance", 0.02, (0.01, 0.05, 0.01), "Touch tolerance"),
  ParamMeta::period("min_touches", 2.0, (2.0, 5.0, 1.0), "Minimum touches"),
];

impl ParameterizedDetector for ResistanceLevelDetector {
  fn param_meta() -> &'static [ParamMeta] {
    RESISTANCE_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      lookback:    get_period(params, "lookback", 50)?,
      percentile:  get_ratio(params, "percentile", 0.95)?,
      tolerance:   get_ratio(params, "tolerance", 0.02)?,
      min_touches: get_period(params, "min_touches", 2)?,
    })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::RESISTANCE_LEVEL.as_str()
  }
}

impl ParameterizedDetector for SupportLevelDetector {
  fn param_meta() -> &'static [ParamMeta] {
    SUPPORT_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      lookback:    get_period(params, "lookback", 50)?,
      percentile:  get_ratio(params, "percentile", 0.05)?,
      tolerance:   get_ratio(params, "tolerance", 0.02)?,
      min_touches: get_period(params, "min_touches", 2)?,
    })
  }

  fn pattern_id_str() -> &'static str {
    PatternId::SUPPORT_LEVEL.as_str()
  }
}
