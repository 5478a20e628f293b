//! # chartscan - Chart Pattern Recognition Engine
//!
//! Detects classic technical-analysis chart patterns in OHLCV series: reversal
//! (Head & Shoulders, Double/Triple Top/Bottom, Wedges), continuation (Triangles, Flags),
//! candlestick (Engulfing, Hammer, Shooting Star, Doji) and support/resistance levels.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartscan::prelude::*;
//! use chrono::{DateTime, Utc};
//!
//! let candles: Vec<Candle> = (0..60)
//!     .map(|i| {
//!         let ts = DateTime::<Utc>::from_timestamp(1_700_000_000 + i * 86_400, 0).unwrap();
//!         let base = 100.0 + (i as f64 * 0.3).sin() * 5.0;
//!         Candle::new(ts, base, base + 1.0, base - 1.0, base + 0.2, 1_000.0)
//!     })
//!     .collect();
//!
//! // Create engine with every builtin detector
//! let engine = EngineBuilder::new()
//!     .with_all_defaults()
//!     .build()
//!     .unwrap();
//!
//! // Ranked by confidence, then recency
//! let patterns = engine.scan(&candles).unwrap();
//! for m in &patterns {
//!     assert!((0.0..=1.0).contains(&m.confidence));
//! }
//! ```

pub mod cache;
pub mod config;
pub mod detectors;
pub mod params;
pub mod provider;
pub mod report;
pub mod service;

pub mod prelude {
    pub use crate::{
        // Services
        cache::{AnalysisCache, TtlCache},
        config::EngineConfig,
        // Detectors
        detectors::*,
        // Parameters
        params::{get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
        provider::{Backoff, CandleProvider, CandleRequest, ProviderError, RetryPolicy},
        report::{AnalysisReport, PatternSummary},
        service::PatternAnalyzer,
        // Engine
        detect_all_patterns,
        rank_matches,
        rank_order,
        scan_parallel,
        BuiltinDetector,
        EngineBuilder,
        PatternEngine,
        ScanError,
        ScanResult,
        // Core traits
        ContextProvider,
        DefaultContextProvider,
        DynPatternDetector,
        OHLCVExt,
        PatternDetector,
        OHLCV,
        // Types
        Candle,
        Direction,
        MatchDraft,
        PatternCategory,
        PatternDetails,
        PatternId,
        PatternMatch,
        Period,
        Ratio,
        SeriesContext,
        // Errors
        PatternError,
        Result,
    };
}

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, warn};

use detectors::extrema::{find_extrema, Swings};

/// Default minimum series length before any detector runs
pub const MIN_SERIES_BARS: usize = 20;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that can occur during pattern detection
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Window {start}..{end} out of bounds for {len} bars")]
    WindowOutOfBounds { start: usize, end: usize, len: usize },

    #[error("Candle provider failed: {0}")]
    Provider(#[from] provider::ProviderError),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn timestamp(&self) -> DateTime<Utc>;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Blanket impl for references to dyn OHLCV
impl OHLCV for &dyn OHLCV {
    fn timestamp(&self) -> DateTime<Utc> {
        (*self).timestamp()
    }

    fn open(&self) -> f64 {
        (*self).open()
    }

    fn high(&self) -> f64 {
        (*self).high()
    }

    fn low(&self) -> f64 {
        (*self).low()
    }

    fn close(&self) -> f64 {
        (*self).close()
    }

    fn volume(&self) -> f64 {
        (*self).volume()
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Body as ratio of range. Returns None if range ≈ 0
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close(), self.volume()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if prices.iter().any(|p| *p < 0.0) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Negative value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// A single timestamped OHLCV record
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Candle {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

// ============================================================
// PATTERN CATALOG
// ============================================================

/// Pattern family
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    Reversal,
    Continuation,
    Candlestick,
    SupportResistance,
}

/// Direction/bias of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }
}

mod catalog {
    use super::Direction::{Bearish, Bullish, Neutral};
    use super::PatternCategory::{self, Candlestick, Continuation, Reversal, SupportResistance};
    use super::Direction;

    pub(super) struct CatalogEntry {
        pub id: &'static str,
        pub name: &'static str,
        pub category: PatternCategory,
        pub direction: Direction,
        pub description: &'static str,
    }

    const fn entry(
        id: &'static str,
        name: &'static str,
        category: PatternCategory,
        direction: Direction,
        description: &'static str,
    ) -> CatalogEntry {
        CatalogEntry {
            id,
            name,
            category,
            direction,
            description,
        }
    }

    #[rustfmt::skip]
    pub(super) static CATALOG: &[CatalogEntry] = &[
        entry("HEAD_AND_SHOULDERS", "Head and Shoulders", Reversal, Bearish,
            "Bearish reversal pattern indicating potential downtrend"),
        entry("INVERSE_HEAD_AND_SHOULDERS", "Inverse Head and Shoulders", Reversal, Bullish,
            "Bullish reversal pattern indicating potential uptrend"),
        entry("DOUBLE_TOP", "Double Top", Reversal, Bearish,
            "Bearish reversal pattern with two peaks at similar levels"),
        entry("DOUBLE_BOTTOM", "Double Bottom", Reversal, Bullish,
            "Bullish reversal pattern with two troughs at similar levels"),
        entry("TRIPLE_TOP", "Triple Top", Reversal, Bearish,
            "Strong bearish reversal with three resistance tests"),
        entry("TRIPLE_BOTTOM", "Triple Bottom", Reversal, Bullish,
            "Strong bullish reversal with three support tests"),
        entry("ASCENDING_TRIANGLE", "Ascending Triangle", Continuation, Bullish,
            "Bullish continuation pattern with flat resistance and rising support"),
        entry("DESCENDING_TRIANGLE", "Descending Triangle", Continuation, Bearish,
            "Bearish continuation pattern with flat support and falling resistance"),
        entry("SYMMETRICAL_TRIANGLE", "Symmetrical Triangle", Continuation, Neutral,
            "Consolidation pattern with converging trendlines"),
        entry("BULL_FLAG", "Bull Flag", Continuation, Bullish,
            "Bullish continuation after consolidation"),
        entry("BEAR_FLAG", "Bear Flag", Continuation, Bearish,
            "Bearish continuation after consolidation"),
        entry("RISING_WEDGE", "Rising Wedge", Reversal, Bearish,
            "Bearish pattern with converging upward trendlines"),
        entry("FALLING_WEDGE", "Falling Wedge", Reversal, Bullish,
            "Bullish pattern with converging downward trendlines"),
        entry("BULLISH_ENGULFING", "Bullish Engulfing", Candlestick, Bullish,
            "Strong bullish reversal candlestick pattern"),
        entry("BEARISH_ENGULFING", "Bearish Engulfing", Candlestick, Bearish,
            "Strong bearish reversal candlestick pattern"),
        entry("HAMMER", "Hammer", Candlestick, Bullish,
            "Bullish reversal with long lower shadow"),
        entry("SHOOTING_STAR", "Shooting Star", Candlestick, Bearish,
            "Bearish reversal with long upper shadow"),
        entry("DOJI", "Doji", Candlestick, Neutral,
            "Market indecision, potential reversal"),
        entry("RESISTANCE_LEVEL", "Resistance Level", SupportResistance, Neutral,
            "Strong resistance"),
        entry("SUPPORT_LEVEL", "Support Level", SupportResistance, Neutral,
            "Strong support"),
    ];
}

use catalog::{CatalogEntry, CATALOG};

/// Unique identifier for a pattern type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternId(pub &'static str);

impl PatternId {
    pub const HEAD_AND_SHOULDERS: Self = Self("HEAD_AND_SHOULDERS");
    pub const INVERSE_HEAD_AND_SHOULDERS: Self = Self("INVERSE_HEAD_AND_SHOULDERS");
    pub const DOUBLE_TOP: Self = Self("DOUBLE_TOP");
    pub const DOUBLE_BOTTOM: Self = Self("DOUBLE_BOTTOM");
    pub const TRIPLE_TOP: Self = Self("TRIPLE_TOP");
    pub const TRIPLE_BOTTOM: Self = Self("TRIPLE_BOTTOM");
    pub const ASCENDING_TRIANGLE: Self = Self("ASCENDING_TRIANGLE");
    pub const DESCENDING_TRIANGLE: Self = Self("DESCENDING_TRIANGLE");
    pub const SYMMETRICAL_TRIANGLE: Self = Self("SYMMETRICAL_TRIANGLE");
    pub const BULL_FLAG: Self = Self("BULL_FLAG");
    pub const BEAR_FLAG: Self = Self("BEAR_FLAG");
    pub const RISING_WEDGE: Self = Self("RISING_WEDGE");
    pub const FALLING_WEDGE: Self = Self("FALLING_WEDGE");
    pub const BULLISH_ENGULFING: Self = Self("BULLISH_ENGULFING");
    pub const BEARISH_ENGULFING: Self = Self("BEARISH_ENGULFING");
    pub const HAMMER: Self = Self("HAMMER");
    pub const SHOOTING_STAR: Self = Self("SHOOTING_STAR");
    pub const DOJI: Self = Self("DOJI");
    pub const RESISTANCE_LEVEL: Self = Self("RESISTANCE_LEVEL");
    pub const SUPPORT_LEVEL: Self = Self("SUPPORT_LEVEL");

    /// Returns the string identifier
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    fn entry(&self) -> Option<&'static CatalogEntry> {
        CATALOG.iter().find(|e| e.id == self.0)
    }

    /// Human-readable name ("Double Top"). Unknown ids return the raw identifier.
    pub fn name(&self) -> &'static str {
        self.entry().map_or(self.0, |e| e.name)
    }

    /// Pattern family for builtin ids, `None` for custom ones
    pub fn category(&self) -> Option<PatternCategory> {
        self.entry().map(|e| e.category)
    }

    /// Returns the typical/expected direction of this pattern, `None` for custom ids.
    pub fn typical_direction(&self) -> Option<Direction> {
        self.entry().map(|e| e.direction)
    }

    pub fn description(&self) -> &'static str {
        self.entry().map_or("", |e| e.description)
    }

    /// Resolve an identifier or display name, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        CATALOG
            .iter()
            .find(|e| e.id.eq_ignore_ascii_case(name) || e.name.eq_ignore_ascii_case(name))
            .map(|e| Self(e.id))
    }

    /// All builtin pattern ids
    pub fn all() -> impl Iterator<Item = PatternId> {
        CATALOG.iter().map(|e| Self(e.id))
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl serde::Serialize for PatternId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.name())
    }
}

// ============================================================
// PATTERN MATCH
// ============================================================

/// Pattern-specific price levels. One shape per pattern family.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternDetails {
    HeadAndShoulders {
        left_shoulder: f64,
        head: f64,
        right_shoulder: f64,
        neckline: f64,
        target_price: f64,
    },
    /// Double top/bottom; `breakout` is the intervening trough (top) or peak (bottom)
    DoubleExtreme {
        first: f64,
        second: f64,
        breakout: f64,
        target_price: f64,
    },
    TripleExtreme {
        level: f64,
        breakout: f64,
        target_price: f64,
    },
    Triangle {
        flat_level: f64,
        sloped_start: f64,
        sloped_end: f64,
    },
    /// Trendline slopes in price per bar
    Converging {
        upper_slope: f64,
        lower_slope: f64,
    },
    Flag {
        pole_start: f64,
        pole_end: f64,
        flag_high: f64,
        flag_low: f64,
    },
    Candlestick {
        body: f64,
        upper_shadow: f64,
        lower_shadow: f64,
    },
    Level {
        level: f64,
        touches: usize,
    },
}

impl PatternDetails {
    /// Named key levels (prices, or the touch count for levels)
    pub fn key_levels(&self) -> Vec<(&'static str, f64)> {
        match *self {
            Self::HeadAndShoulders {
                left_shoulder,
                head,
                right_shoulder,
                neckline,
                ..
            } => vec![
                ("left_shoulder", left_shoulder),
                ("head", head),
                ("right_shoulder", right_shoulder),
                ("neckline", neckline),
            ],
            Self::DoubleExtreme {
                first,
                second,
                breakout,
                ..
            } => vec![("first", first), ("second", second), ("breakout", breakout)],
            Self::TripleExtreme {
                level, breakout, ..
            } => vec![("level", level), ("breakout", breakout)],
            Self::Triangle {
                flat_level,
                sloped_start,
                sloped_end,
            } => vec![
                ("flat_level", flat_level),
                ("sloped_start", sloped_start),
                ("sloped_end", sloped_end),
            ],
            Self::Converging { .. } | Self::Candlestick { .. } => Vec::new(),
            Self::Flag {
                pole_start,
                pole_end,
                flag_high,
                flag_low,
            } => vec![
                ("pole_start", pole_start),
                ("pole_end", pole_end),
                ("flag_high", flag_high),
                ("flag_low", flag_low),
            ],
            Self::Level { level, touches } => vec![("level", level), ("touches", touches as f64)],
        }
    }

    /// Measured-move projection, when the pattern defines one
    pub fn target_price(&self) -> Option<f64> {
        match *self {
            Self::HeadAndShoulders { target_price, .. }
            | Self::DoubleExtreme { target_price, .. }
            | Self::TripleExtreme { target_price, .. } => Some(target_price),
            _ => None,
        }
    }

    fn is_finite(&self) -> bool {
        let extra = match *self {
            Self::Converging {
                upper_slope,
                lower_slope,
            } => vec![upper_slope, lower_slope],
            Self::Candlestick {
                body,
                upper_shadow,
                lower_shadow,
            } => vec![body, upper_shadow, lower_shadow],
            _ => Vec::new(),
        };
        self.key_levels()
            .iter()
            .map(|(_, v)| *v)
            .chain(self.target_price())
            .chain(extra)
            .all(f64::is_finite)
    }
}

/// A detected pattern occurrence
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PatternMatch {
    #[serde(rename = "pattern")]
    pub pattern_id: PatternId,
    pub category: PatternCategory,
    pub direction: Direction,
    /// Heuristic score 0.0..=1.0, not a probability
    pub confidence: f64,
    pub start_index: usize,
    pub end_index: usize,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub details: PatternDetails,
    pub description: String,
}

impl PatternMatch {
    #[inline]
    pub fn name(&self) -> &'static str {
        self.pattern_id.name()
    }

    pub fn key_levels(&self) -> Vec<(&'static str, f64)> {
        self.details.key_levels()
    }

    pub fn target_price(&self) -> Option<f64> {
        self.details.target_price()
    }

    /// Number of bars spanned, inclusive
    pub fn bar_count(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

/// Candidate match before it is anchored to the series
#[derive(Debug, Clone)]
pub struct MatchDraft {
    pub pattern_id: PatternId,
    pub category: PatternCategory,
    pub direction: Direction,
    pub start_index: usize,
    pub end_index: usize,
    pub confidence: f64,
    pub details: PatternDetails,
}

impl MatchDraft {
    /// Resolve dates and description. Returns `None` instead of a partially
    /// populated match when indices or values are unusable.
    pub fn finish<T: OHLCV>(self, bars: &[T]) -> Option<PatternMatch> {
        if self.start_index > self.end_index
            || !self.confidence.is_finite()
            || !self.details.is_finite()
        {
            return None;
        }
        let start = bars.get(self.start_index)?;
        let end = bars.get(self.end_index)?;

        let description = match self.details {
            PatternDetails::Level { level, .. } => {
                format!("{} at {:.2}", self.pattern_id.description(), level)
            }
            _ => self.pattern_id.description().to_string(),
        };

        Some(PatternMatch {
            pattern_id: self.pattern_id,
            category: self.category,
            direction: self.direction,
            confidence: detectors::helpers::round_confidence(self.confidence),
            start_index: self.start_index,
            end_index: self.end_index,
            start_date: start.timestamp(),
            end_date: end.timestamp(),
            details: self.details,
            description,
        })
    }
}

/// Ranking order: confidence descending, then end index descending.
pub fn rank_order(a: &PatternMatch, b: &PatternMatch) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.end_index.cmp(&a.end_index))
}

/// Sort matches in place by [`rank_order`]. Stable, no deduplication.
pub fn rank_matches(matches: &mut [PatternMatch]) {
    matches.sort_by(rank_order);
}

// ============================================================
// SERIES CONTEXT
// ============================================================

/// Read-only data shared by all detectors during one scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesContext {
    /// Swings at the standard window half-width
    pub swings: Swings,
    /// Swings at the looser window used by three-point patterns
    pub fine_swings: Swings,
}

/// Provider of series context - computed once per scan, before detectors run
pub trait ContextProvider: Send + Sync {
    fn compute<T: OHLCV>(&self, bars: &[T]) -> SeriesContext;
}

/// Extrema at order 3 and order 2
#[derive(Debug, Clone)]
pub struct DefaultContextProvider {
    pub order: Period,
    pub fine_order: Period,
}

impl Default for DefaultContextProvider {
    fn default() -> Self {
        Self {
            order: Period::new_const(3),
            fine_order: Period::new_const(2),
        }
    }
}

impl ContextProvider for DefaultContextProvider {
    fn compute<T: OHLCV>(&self, bars: &[T]) -> SeriesContext {
        SeriesContext {
            swings: find_extrema(bars, self.order),
            fine_swings: find_extrema(bars, self.fine_order),
        }
    }
}

// ============================================================
// PATTERN DETECTOR TRAITS
// ============================================================

/// Additional metadata about a pattern
#[derive(Debug, Clone)]
pub struct PatternMetadata {
    pub name: &'static str,
    pub description: &'static str,
    pub category: PatternCategory,
}

/// Generic pattern detector trait - for concrete types
pub trait PatternDetector: Send + Sync {
    fn id(&self) -> PatternId;
    fn category(&self) -> PatternCategory;
    fn min_bars(&self) -> usize;
    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Result<Vec<PatternMatch>>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }

    fn metadata(&self) -> PatternMetadata {
        PatternMetadata {
            name: self.id().name(),
            description: self.id().description(),
            category: self.category(),
        }
    }
}

/// Object-safe pattern detector trait - for custom detectors
pub trait DynPatternDetector: Send + Sync {
    fn id(&self) -> PatternId;
    fn category(&self) -> PatternCategory;
    fn min_bars(&self) -> usize;
    fn detect(&self, bars: &[&dyn OHLCV], ctx: &SeriesContext) -> Result<Vec<PatternMatch>>;
    fn validate_config(&self) -> Result<()>;
}

impl<D: PatternDetector> DynPatternDetector for D {
    fn id(&self) -> PatternId {
        PatternDetector::id(self)
    }

    fn category(&self) -> PatternCategory {
        PatternDetector::category(self)
    }

    fn min_bars(&self) -> usize {
        PatternDetector::min_bars(self)
    }

    fn detect(&self, bars: &[&dyn OHLCV], ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
        PatternDetector::detect(self, bars, ctx)
    }

    fn validate_config(&self) -> Result<()> {
        PatternDetector::validate_config(self)
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect<T: OHLCV>(
                &self,
                bars: &[T],
                ctx: &SeriesContext,
            ) -> Result<Vec<PatternMatch>> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, bars, ctx)),*
                }
            }

            #[inline]
            pub fn id(&self) -> PatternId {
                match self {
                    $(Self::$variant(d) => PatternDetector::id(d)),*
                }
            }

            #[inline]
            pub fn category(&self) -> PatternCategory {
                match self {
                    $(Self::$variant(d) => PatternDetector::category(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    // Reversal (6)
    HeadAndShoulders(HeadAndShouldersDetector),
    InverseHeadAndShoulders(InverseHeadAndShouldersDetector),
    DoubleTop(DoubleTopDetector),
    DoubleBottom(DoubleBottomDetector),
    TripleTop(TripleTopDetector),
    TripleBottom(TripleBottomDetector),

    // Continuation (7)
    AscendingTriangle(AscendingTriangleDetector),
    DescendingTriangle(DescendingTriangleDetector),
    SymmetricalTriangle(SymmetricalTriangleDetector),
    BullFlag(BullFlagDetector),
    BearFlag(BearFlagDetector),
    RisingWedge(RisingWedgeDetector),
    FallingWedge(FallingWedgeDetector),

    // Candlestick (5)
    BullishEngulfing(BullishEngulfingDetector),
    BearishEngulfing(BearishEngulfingDetector),
    Hammer(HammerDetector),
    ShootingStar(ShootingStarDetector),
    Doji(DojiDetector),

    // Support/Resistance (2)
    ResistanceLevel(ResistanceLevelDetector),
    SupportLevel(SupportLevelDetector),
}

// ============================================================
// PATTERN ENGINE
// ============================================================

/// Runtime scan options
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub min_bars: usize,
    pub min_confidence: Option<f64>,
    pub validate_data: bool,
    pub parallel: bool,
    pub pattern_filter: Option<Vec<PatternId>>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            min_bars: MIN_SERIES_BARS,
            min_confidence: None,
            validate_data: false,
            parallel: true,
            pattern_filter: None,
        }
    }
}

/// Main pattern detection engine
pub struct PatternEngine<C: ContextProvider = DefaultContextProvider> {
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn DynPatternDetector>>,
    context_provider: C,
    options: ScanOptions,
}

impl<C: ContextProvider> PatternEngine<C> {
    pub fn new(context_provider: C) -> Self {
        Self {
            builtin: Vec::new(),
            custom: Vec::new(),
            context_provider,
            options: ScanOptions::default(),
        }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Number of registered detectors (builtin and custom)
    pub fn detector_count(&self) -> usize {
        self.builtin.len() + self.custom.len()
    }

    /// Compute the shared context (extrema) for a series.
    #[inline]
    pub fn compute_context<T: OHLCV>(&self, bars: &[T]) -> SeriesContext {
        self.context_provider.compute(bars)
    }

    /// Run every detector and return the ranked matches.
    ///
    /// Series shorter than `min_bars` yield an empty list. A detector that
    /// returns an error is logged and contributes nothing.
    pub fn scan<T: OHLCV + Sync>(&self, bars: &[T]) -> Result<Vec<PatternMatch>> {
        if self.options.validate_data {
            self.validate_bars(bars)?;
        }
        if bars.len() < self.options.min_bars {
            debug!(
                bars = bars.len(),
                min_bars = self.options.min_bars,
                "series too short, skipping detection"
            );
            return Ok(Vec::new());
        }

        let ctx = self.compute_context(bars);
        let mut matches = self.run_builtin(bars, &ctx);
        matches.extend(self.run_custom(bars, &ctx));
        matches.retain(|m| self.should_include(m));
        rank_matches(&mut matches);

        debug!(
            bars = bars.len(),
            peaks = ctx.swings.peaks.len(),
            troughs = ctx.swings.troughs.len(),
            matches = matches.len(),
            "pattern scan complete"
        );
        Ok(matches)
    }

    /// Scan and return ranked patterns grouped by category.
    pub fn scan_grouped<T: OHLCV + Sync>(
        &self,
        bars: &[T],
    ) -> Result<BTreeMap<PatternCategory, Vec<PatternMatch>>> {
        let mut grouped: BTreeMap<PatternCategory, Vec<PatternMatch>> = BTreeMap::new();
        for m in self.scan(bars)? {
            grouped.entry(m.category).or_default().push(m);
        }
        Ok(grouped)
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn run_builtin<T: OHLCV + Sync>(&self, bars: &[T], ctx: &SeriesContext) -> Vec<PatternMatch> {
        let len = bars.len();
        if self.options.parallel {
            self.builtin
                .par_iter()
                .filter(|d| len >= d.min_bars())
                .flat_map_iter(|d| isolate(d.id(), d.detect(bars, ctx)))
                .collect()
        } else {
            self.builtin
                .iter()
                .filter(|d| len >= d.min_bars())
                .flat_map(|d| isolate(d.id(), d.detect(bars, ctx)))
                .collect()
        }
    }

    fn run_custom<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Vec<PatternMatch> {
        if self.custom.is_empty() {
            return Vec::new();
        }
        let bar_refs: Vec<&dyn OHLCV> = bars.iter().map(|b| b as &dyn OHLCV).collect();
        self.custom
            .iter()
            .filter(|d| bar_refs.len() >= d.min_bars())
            .flat_map(|d| isolate(d.id(), d.detect(&bar_refs, ctx)))
            .collect()
    }

    fn should_include(&self, m: &PatternMatch) -> bool {
        if let Some(min) = self.options.min_confidence {
            if m.confidence < min {
                return false;
            }
        }
        if let Some(ref filter) = self.options.pattern_filter {
            if !filter.contains(&m.pattern_id) {
                return false;
            }
        }
        true
    }

    fn validate_bars<T: OHLCV>(&self, bars: &[T]) -> Result<()> {
        for (i, bar) in bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                PatternError::InvalidOHLCV { reason, .. } => {
                    PatternError::InvalidOHLCV { index: i, reason }
                }
                other => other,
            })?;
            if i > 0 && bar.timestamp() <= bars[i - 1].timestamp() {
                return Err(PatternError::InvalidOHLCV {
                    index: i,
                    reason: "timestamps not strictly ascending",
                });
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.options.min_bars < MIN_SERIES_BARS {
            return Err(PatternError::OutOfRange {
                field: "min_bars",
                value: self.options.min_bars as f64,
                min: MIN_SERIES_BARS as f64,
                max: f64::INFINITY,
            });
        }
        if let Some(min) = self.options.min_confidence {
            Ratio::new(min)?;
        }
        for d in &self.builtin {
            d.validate_config()?;
        }
        for d in &self.custom {
            d.validate_config()?;
        }
        Ok(())
    }
}

/// Partial-failure isolation at the detector boundary
fn isolate(id: PatternId, result: Result<Vec<PatternMatch>>) -> Vec<PatternMatch> {
    match result {
        Ok(matches) => matches,
        Err(error) => {
            warn!(pattern = id.as_str(), %error, "detector failed, skipping");
            Vec::new()
        }
    }
}

/// Detect every builtin pattern with default settings.
///
/// Never fails: errors are logged and yield an empty list.
pub fn detect_all_patterns<T: OHLCV + Sync>(bars: &[T]) -> Vec<PatternMatch> {
    match EngineBuilder::new()
        .with_all_defaults()
        .build()
        .and_then(|engine| engine.scan(bars))
    {
        Ok(matches) => matches,
        Err(error) => {
            warn!(%error, "pattern detection failed");
            Vec::new()
        }
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternEngine instances
pub struct EngineBuilder<C: ContextProvider = DefaultContextProvider> {
    context_provider: C,
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn DynPatternDetector>>,
    options: ScanOptions,
}

impl Default for EngineBuilder<DefaultContextProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<DefaultContextProvider> {
    pub fn new() -> Self {
        Self {
            context_provider: DefaultContextProvider::default(),
            builtin: Vec::new(),
            custom: Vec::new(),
            options: ScanOptions::default(),
        }
    }

    /// Builder populated from a validated [`config::EngineConfig`]
    pub fn from_config(config: &config::EngineConfig) -> Result<Self> {
        config.validate()?;

        let provider = DefaultContextProvider {
            order: Period::new(config.extrema.order)?,
            fine_order: Period::new(config.extrema.fine_order)?,
        };
        let flag_limit = Period::new(config.limits.flags)?;
        let candle_limit = Period::new(config.limits.candlesticks)?;
        let lookback = Period::new(config.levels.lookback)?;
        let tolerance = Ratio::new(config.levels.tolerance)?;

        let mut builder = Self::new()
            .context_provider(provider)
            .with_reversal_defaults()
            .add(BuiltinDetector::AscendingTriangle(Default::default()))
            .add(BuiltinDetector::DescendingTriangle(Default::default()))
            .add(BuiltinDetector::SymmetricalTriangle(Default::default()))
            .add(BuiltinDetector::BullFlag(BullFlagDetector {
                recent_limit: flag_limit,
                ..Default::default()
            }))
            .add(BuiltinDetector::BearFlag(BearFlagDetector {
                recent_limit: flag_limit,
                ..Default::default()
            }))
            .add(BuiltinDetector::RisingWedge(Default::default()))
            .add(BuiltinDetector::FallingWedge(Default::default()))
            .add(BuiltinDetector::BullishEngulfing(BullishEngulfingDetector {
                recent_limit: candle_limit,
            }))
            .add(BuiltinDetector::BearishEngulfing(BearishEngulfingDetector {
                recent_limit: candle_limit,
            }))
            .add(BuiltinDetector::Hammer(HammerDetector {
                recent_limit: candle_limit,
                ..Default::default()
            }))
            .add(BuiltinDetector::ShootingStar(ShootingStarDetector {
                recent_limit: candle_limit,
                ..Default::default()
            }))
            .add(BuiltinDetector::Doji(DojiDetector {
                recent_limit: candle_limit,
                ..Default::default()
            }))
            .add(BuiltinDetector::ResistanceLevel(ResistanceLevelDetector {
                lookback,
                tolerance,
                ..Default::default()
            }))
            .add(BuiltinDetector::SupportLevel(SupportLevelDetector {
                lookback,
                tolerance,
                ..Default::default()
            }))
            .min_bars(config.min_bars)
            .validate_data(config.validate_data)
            .parallel(config.parallel);

        if let Some(min) = config.min_confidence {
            builder = builder.min_confidence(min);
        }
        if let Some(ref names) = config.patterns {
            let ids = names
                .iter()
                .map(|name| {
                    PatternId::from_name(name)
                        .ok_or_else(|| PatternError::InvalidConfig(format!("unknown pattern: {name}")))
                })
                .collect::<Result<Vec<_>>>()?;
            builder = builder.only_patterns(ids);
        }
        Ok(builder)
    }
}

/// Generate an array of `BuiltinDetector` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
  ($($variant:ident),* $(,)?) => {
    [$(BuiltinDetector::$variant(Default::default())),*]
  };
}

impl<C: ContextProvider> EngineBuilder<C> {
    /// Change context provider
    pub fn context_provider<C2: ContextProvider>(self, provider: C2) -> EngineBuilder<C2> {
        EngineBuilder {
            context_provider: provider,
            builtin: self.builtin,
            custom: self.custom,
            options: self.options,
        }
    }

    /// Add all builtin patterns with default configurations
    pub fn with_all_defaults(self) -> Self {
        self.with_reversal_defaults()
            .with_continuation_defaults()
            .with_candlestick_defaults()
            .with_level_defaults()
    }

    /// Add reversal patterns with defaults (6)
    pub fn with_reversal_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            HeadAndShoulders,
            InverseHeadAndShoulders,
            DoubleTop,
            DoubleBottom,
            TripleTop,
            TripleBottom,
        ]);
        self
    }

    /// Add triangles, flags and wedges with defaults (7). Wedges report as reversals.
    pub fn with_continuation_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            AscendingTriangle,
            DescendingTriangle,
            SymmetricalTriangle,
            BullFlag,
            BearFlag,
            RisingWedge,
            FallingWedge,
        ]);
        self
    }

    /// Add candlestick patterns with defaults (5)
    pub fn with_candlestick_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            BullishEngulfing,
            BearishEngulfing,
            Hammer,
            ShootingStar,
            Doji,
        ]);
        self
    }

    /// Add support/resistance levels with defaults (2)
    pub fn with_level_defaults(mut self) -> Self {
        self.builtin
            .extend(builtin_defaults![ResistanceLevel, SupportLevel]);
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.builtin.push(detector);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: BuiltinDetector) -> Result<Self> {
        detector.validate_config()?;
        self.builtin.push(detector);
        Ok(self)
    }

    /// Add a custom detector (slow path, always sequential)
    pub fn add_custom<D: DynPatternDetector + 'static>(mut self, detector: D) -> Self {
        self.custom.push(Box::new(detector));
        self
    }

    /// Set minimum confidence filter
    pub fn min_confidence(mut self, confidence: f64) -> Self {
        self.options.min_confidence = Some(confidence);
        self
    }

    /// Minimum series length before detection runs. `build` rejects values
    /// below [`MIN_SERIES_BARS`].
    pub fn min_bars(mut self, bars: usize) -> Self {
        self.options.min_bars = bars;
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.options.validate_data = enable;
        self
    }

    /// Run builtin detectors on the rayon pool
    pub fn parallel(mut self, enable: bool) -> Self {
        self.options.parallel = enable;
        self
    }

    /// Filter to specific patterns only
    pub fn only_patterns(mut self, ids: impl IntoIterator<Item = PatternId>) -> Self {
        self.options.pattern_filter = Some(ids.into_iter().collect());
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PatternEngine<C>> {
        let engine = PatternEngine {
            builtin: self.builtin,
            custom: self.custom,
            context_provider: self.context_provider,
            options: self.options,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

/// Result of scanning a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub patterns: Vec<PatternMatch>,
}

/// Error from scanning a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: PatternError,
}

/// Parallel scanning of multiple instruments
pub fn scan_parallel<'a, T, I, C>(
    engine: &PatternEngine<C>,
    instruments: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
    C: ContextProvider + Sync,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            engine
                .scan(bars)
                .map(|patterns| ScanResult {
                    symbol: symbol.to_string(),
                    patterns,
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TYPE ALIASES
// ============================================================

/// Default engine with DefaultContextProvider
pub type DefaultEngine = PatternEngine<DefaultContextProvider>;

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn ts(i: usize) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + i as i64 * 86_400, 0).unwrap()
    }

    pub fn bar(i: usize, o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle::new(ts(i), o, h, l, c, 1000.0)
    }

    /// Bars whose high/low follow `mid`, with a small bullish body
    pub fn from_mids(mids: &[f64]) -> Vec<Candle> {
        mids.iter()
            .enumerate()
            .map(|(i, &m)| bar(i, m - 0.1, m + 0.5, m - 0.5, m + 0.1))
            .collect()
    }

    /// Same bar repeated
    pub fn flat(n: usize, price: f64) -> Vec<Candle> {
        (0..n).map(|i| bar(i, price, price, price, price)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn make_wave(n: usize) -> Vec<Candle> {
        let mids: Vec<f64> = (0..n)
            .map(|i| 100.0 + (i as f64 * 0.4).sin() * 6.0 + i as f64 * 0.05)
            .collect();
        from_mids(&mids)
    }

    fn stub_match(confidence: f64, end_index: usize) -> PatternMatch {
        PatternMatch {
            pattern_id: PatternId::DOJI,
            category: PatternCategory::Candlestick,
            direction: Direction::Neutral,
            confidence,
            start_index: end_index,
            end_index,
            start_date: ts(end_index),
            end_date: ts(end_index),
            details: PatternDetails::Candlestick {
                body: 0.0,
                upper_shadow: 1.0,
                lower_shadow: 1.0,
            },
            description: String::new(),
        }
    }

    struct FailingDetector;

    impl PatternDetector for FailingDetector {
        fn id(&self) -> PatternId {
            PatternId("ALWAYS_FAILS")
        }

        fn category(&self) -> PatternCategory {
            PatternCategory::Continuation
        }

        fn min_bars(&self) -> usize {
            1
        }

        fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &SeriesContext) -> Result<Vec<PatternMatch>> {
            Err(PatternError::WindowOutOfBounds {
                start: 0,
                end: bars.len() + 1,
                len: bars.len(),
            })
        }
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_ohlcv_ext() {
        let c = bar(0, 100.0, 110.0, 90.0, 105.0);
        assert_eq!(c.body(), 5.0);
        assert_eq!(c.range(), 20.0);
        assert_eq!(c.upper_shadow(), 5.0);
        assert_eq!(c.lower_shadow(), 10.0);
        assert!(c.is_bullish());
        assert!(!c.is_bearish());
        assert!((c.body_ratio().unwrap() - 0.25).abs() < 0.001);
        assert!(flat(1, 10.0)[0].body_ratio().is_none());
    }

    #[test]
    fn test_candle_validate() {
        assert!(bar(0, 1.0, 2.0, 0.5, 1.5).validate().is_ok());
        assert!(bar(0, 1.0, 0.5, 2.0, 1.5).validate().is_err());
        assert!(bar(0, f64::NAN, 2.0, 0.5, 1.5).validate().is_err());
        assert!(bar(0, -1.0, 2.0, 0.5, 1.5).validate().is_err());
    }

    #[test]
    fn test_catalog_lookup() {
        assert_eq!(PatternId::DOUBLE_TOP.name(), "Double Top");
        assert_eq!(PatternId::RISING_WEDGE.category(), Some(PatternCategory::Reversal));
        assert_eq!(PatternId::HAMMER.typical_direction(), Some(Direction::Bullish));
        assert_eq!(PatternId::from_name("double top"), Some(PatternId::DOUBLE_TOP));
        assert_eq!(PatternId::from_name("BULL_FLAG"), Some(PatternId::BULL_FLAG));
        assert_eq!(PatternId::from_name("cup and handle"), None);
        assert_eq!(PatternId("CUSTOM").name(), "CUSTOM");
        assert_eq!(PatternId::all().count(), 20);
    }

    #[test]
    fn test_engine_builder() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        assert_eq!(engine.detector_count(), 20);
    }

    #[test]
    fn test_invalid_min_confidence_rejected() {
        assert!(EngineBuilder::new().min_confidence(1.5).build().is_err());
        assert!(EngineBuilder::new().min_bars(0).build().is_err());
    }

    #[test]
    fn test_min_bars_floor() {
        assert!(matches!(
            EngineBuilder::new().min_bars(5).build(),
            Err(PatternError::OutOfRange { field: "min_bars", .. })
        ));
        assert!(EngineBuilder::new().min_bars(MIN_SERIES_BARS).build().is_ok());
        assert!(EngineBuilder::new().min_bars(60).build().is_ok());
    }

    #[test]
    fn test_empty_scan() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let bars: Vec<Candle> = vec![];
        assert!(engine.scan(&bars).unwrap().is_empty());
    }

    #[test]
    fn test_short_series_yields_nothing() {
        let bars = make_wave(19);
        assert!(detect_all_patterns(&bars).is_empty());
    }

    #[test]
    fn test_rank_order_confidence_dominates() {
        let mut matches = vec![stub_match(0.7, 50), stub_match(0.9, 10)];
        rank_matches(&mut matches);
        assert_eq!(matches[0].confidence, 0.9);
        assert_eq!(matches[1].end_index, 50);
    }

    #[test]
    fn test_rank_order_recency_breaks_ties() {
        let mut matches = vec![stub_match(0.7, 5), stub_match(0.7, 30), stub_match(0.7, 12)];
        rank_matches(&mut matches);
        let ends: Vec<_> = matches.iter().map(|m| m.end_index).collect();
        assert_eq!(ends, vec![30, 12, 5]);
    }

    #[test]
    fn test_scan_is_ranked() {
        let bars = make_wave(120);
        let matches = detect_all_patterns(&bars);
        assert!(!matches.is_empty());
        for pair in matches.windows(2) {
            assert_ne!(rank_order(&pair[0], &pair[1]), Ordering::Greater);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let bars = make_wave(150);
        let par = EngineBuilder::new().with_all_defaults().build().unwrap();
        let seq = EngineBuilder::new()
            .with_all_defaults()
            .parallel(false)
            .build()
            .unwrap();
        assert_eq!(par.scan(&bars).unwrap(), seq.scan(&bars).unwrap());
    }

    #[test]
    fn test_min_confidence_filter() {
        let bars = make_wave(120);
        let engine = EngineBuilder::new()
            .with_all_defaults()
            .min_confidence(0.69)
            .build()
            .unwrap();
        assert!(engine.scan(&bars).unwrap().iter().all(|m| m.confidence >= 0.69));
    }

    #[test]
    fn test_pattern_filter() {
        let bars = make_wave(120);
        let engine = EngineBuilder::new()
            .with_all_defaults()
            .only_patterns([PatternId::RESISTANCE_LEVEL])
            .build()
            .unwrap();
        let matches = engine.scan(&bars).unwrap();
        assert!(matches
            .iter()
            .all(|m| m.pattern_id == PatternId::RESISTANCE_LEVEL));
    }

    #[test]
    fn test_failing_detector_is_isolated() {
        let bars = flat(30, 50.0);
        let engine = EngineBuilder::new()
            .with_level_defaults()
            .add_custom(FailingDetector)
            .build()
            .unwrap();
        let matches = engine.scan(&bars).unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches
            .iter()
            .all(|m| m.category == PatternCategory::SupportResistance));
    }

    #[test]
    fn test_validate_data_rejects_unordered_timestamps() {
        let mut bars = make_wave(30);
        bars[12].timestamp = bars[11].timestamp;
        let engine = EngineBuilder::new()
            .with_all_defaults()
            .validate_data(true)
            .build()
            .unwrap();
        match engine.scan(&bars) {
            Err(PatternError::InvalidOHLCV { index, .. }) => assert_eq!(index, 12),
            other => panic!("expected InvalidOHLCV, got {other:?}"),
        }
    }

    #[test]
    fn test_scan_grouped() {
        let bars = flat(25, 10.0);
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let grouped = engine.scan_grouped(&bars).unwrap();
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[&PatternCategory::SupportResistance].len(), 2);
    }

    #[test]
    fn test_match_draft_rejects_partial_results() {
        let bars = make_wave(30);
        let draft = MatchDraft {
            pattern_id: PatternId::DOUBLE_TOP,
            category: PatternCategory::Reversal,
            direction: Direction::Bearish,
            start_index: 3,
            end_index: 9,
            confidence: 0.75,
            details: PatternDetails::DoubleExtreme {
                first: 100.0,
                second: 100.0,
                breakout: 90.0,
                target_price: f64::NAN,
            },
        };
        assert!(draft.clone().finish(&bars).is_none());

        let out_of_range = MatchDraft {
            end_index: 30,
            ..draft.clone()
        };
        assert!(out_of_range.finish(&bars).is_none());

        let ok = MatchDraft {
            details: PatternDetails::DoubleExtreme {
                first: 100.0,
                second: 100.0,
                breakout: 90.0,
                target_price: 80.0,
            },
            ..draft
        };
        let m = ok.finish(&bars).unwrap();
        assert_eq!(m.start_date, bars[3].timestamp);
        assert_eq!(m.end_date, bars[9].timestamp);
        assert_eq!(m.target_price(), Some(80.0));
        assert_eq!(m.bar_count(), 7);
    }

    #[test]
    fn test_match_serializes_flat_shape() {
        let m = stub_match(0.5, 3);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["pattern"], "Doji");
        assert_eq!(json["category"], "candlestick");
        assert_eq!(json["direction"], "neutral");
        assert_eq!(json["details"]["kind"], "candlestick");
    }

    #[test]
    fn test_parallel_scan() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

        let bars1 = make_wave(80);
        let bars2 = flat(40, 25.0);

        let instruments: Vec<(&str, &[Candle])> =
            vec![("AAPL", &bars1[..]), ("GOOGL", &bars2[..])];

        let (results, errors) = scan_parallel(&engine, instruments);
        assert_eq!(results.len(), 2);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_compute_context() {
        let engine = EngineBuilder::new().build().unwrap();
        let bars = make_wave(60);
        let ctx = engine.compute_context(&bars);
        assert!(!ctx.swings.peaks.is_empty());
        assert!(ctx.fine_swings.peaks.len() >= ctx.swings.peaks.len());
    }
}
