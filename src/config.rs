//! Engine configuration
//!
//! Serde/TOML description of a [`crate::PatternEngine`]. Every field has a
//! default, so an empty document yields the stock engine:
//!
//! ```toml
//! min_bars = 20
//! min_confidence = 0.6
//! parallel = true
//! patterns = ["Double Top", "HAMMER"]
//!
//! [extrema]
//! order = 3
//! fine_order = 2
//!
//! [limits]
//! flags = 3
//! candlesticks = 5
//!
//! [levels]
//! lookback = 50
//! tolerance = 0.02
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{PatternError, PatternId, Result, MIN_SERIES_BARS};

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Series shorter than this produce no matches (default: 20). Values below
    /// the 20-bar floor are rejected.
    #[serde(default = "default_min_bars")]
    pub min_bars: usize,

    /// Drop matches below this confidence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,

    /// Reject malformed bars instead of scanning them (default: false)
    #[serde(default)]
    pub validate_data: bool,

    /// Run detectors on the rayon pool (default: true)
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Restrict output to these patterns, by id or display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<String>>,

    #[serde(default)]
    pub extrema: ExtremaConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub levels: LevelsConfig,
}

/// Swing detection window half-widths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtremaConfig {
    /// Used by most chart patterns (default: 3)
    #[serde(default = "default_order")]
    pub order: usize,

    /// Used by triple top/bottom (default: 2)
    #[serde(default = "default_fine_order")]
    pub fine_order: usize,
}

/// Most recent occurrences reported per detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_flag_limit")]
    pub flags: usize,

    #[serde(default = "default_candlestick_limit")]
    pub candlesticks: usize,
}

/// Support/resistance settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelsConfig {
    #[serde(default = "default_lookback")]
    pub lookback: usize,

    #[serde(default = "default_level_tolerance")]
    pub tolerance: f64,
}

// Defaults
fn default_min_bars() -> usize {
    MIN_SERIES_BARS
}

fn default_true() -> bool {
    true
}

fn default_order() -> usize {
    3
}

fn default_fine_order() -> usize {
    2
}

fn default_flag_limit() -> usize {
    3
}

fn default_candlestick_limit() -> usize {
    5
}

fn default_lookback() -> usize {
    50
}

fn default_level_tolerance() -> f64 {
    0.02
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_bars: default_min_bars(),
            min_confidence: None,
            validate_data: false,
            parallel: true,
            patterns: None,
            extrema: ExtremaConfig::default(),
            limits: LimitsConfig::default(),
            levels: LevelsConfig::default(),
        }
    }
}

impl Default for ExtremaConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            fine_order: default_fine_order(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            flags: default_flag_limit(),
            candlesticks: default_candlestick_limit(),
        }
    }
}

impl Default for LevelsConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            tolerance: default_level_tolerance(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| PatternError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PatternError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_bars < MIN_SERIES_BARS {
            return Err(PatternError::OutOfRange {
                field: "min_bars",
                value: self.min_bars as f64,
                min: MIN_SERIES_BARS as f64,
                max: f64::INFINITY,
            });
        }
        let positive = [
            ("extrema.order", self.extrema.order),
            ("extrema.fine_order", self.extrema.fine_order),
            ("limits.flags", self.limits.flags),
            ("limits.candlesticks", self.limits.candlesticks),
            ("levels.lookback", self.levels.lookback),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(PatternError::InvalidConfig(format!("{field} must be > 0")));
        }

        if let Some(min) = self.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(PatternError::OutOfRange {
                    field: "min_confidence",
                    value: min,
                    min: 0.0,
                    max: 1.0,
                });
            }
        }
        let tolerance = self.levels.tolerance;
        if !(tolerance > 0.0 && tolerance < 1.0) {
            return Err(PatternError::OutOfRange {
                field: "levels.tolerance",
                value: tolerance,
                min: 0.0,
                max: 1.0,
            });
        }

        if let Some(unknown) = self
            .patterns
            .iter()
            .flatten()
            .find(|name| PatternId::from_name(name).is_none())
        {
            return Err(PatternError::InvalidConfig(format!("unknown pattern: {unknown}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.min_bars, 20);
        assert!(config.parallel);
        assert_eq!(config.extrema.order, 3);
        assert_eq!(config.levels.lookback, 50);
    }

    #[test]
    fn test_partial_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            min_confidence = 0.6
            patterns = ["Double Top", "HAMMER"]

            [limits]
            flags = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.min_confidence, Some(0.6));
        assert_eq!(config.limits.flags, 1);
        assert_eq!(config.limits.candlesticks, 5);
        assert_eq!(config.patterns.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(EngineConfig::from_toml_str("min_bars = 0").is_err());
        assert!(EngineConfig::from_toml_str("min_bars = 5").is_err());
        assert!(EngineConfig::from_toml_str("min_bars = 50").is_ok());
        assert!(EngineConfig::from_toml_str("min_confidence = 1.5").is_err());
        assert!(EngineConfig::from_toml_str("[extrema]\norder = 0").is_err());
        assert!(EngineConfig::from_toml_str("[levels]\ntolerance = 0.0").is_err());
        assert!(EngineConfig::from_toml_str("patterns = [\"Cup and Handle\"]").is_err());
        assert!(EngineConfig::from_toml_str("min_bars = \"twenty\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        match EngineConfig::from_path("/nonexistent/chartscan.toml") {
            Err(PatternError::InvalidConfig(msg)) => assert!(msg.contains("cannot read")),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }
}
