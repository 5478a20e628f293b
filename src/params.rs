//! Parameter metadata for pattern detectors
//!
//! This module provides metadata about detector parameters, enabling:
//! - Grid search optimization
//! - Parameter documentation
//! - Automatic configuration UI generation
//!
//! # Example
//!
//! ```rust
//! use chartscan::params::{ParamMeta, ParamType, ParameterizedDetector};
//! use chartscan::prelude::*;
//!
//! // Get parameter metadata for a detector
//! let params = DoubleTopDetector::param_meta();
//! for param in params {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{PatternError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value (0.0..=1.0)
  Ratio,
  /// Period value (positive integer)
  Period,
}

/// Metadata for a single detector parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "shoulder_tolerance")
  pub name: &'static str,
  /// Parameter type (Ratio or Period)
  pub param_type: ParamType,
  /// Default value
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  /// Create a new ParamMeta for a Ratio parameter
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  /// Create a new ParamMeta for a Period parameter
  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ratio::new(value).map(|_| ()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(PatternError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Trait for detectors that support parameterization
///
/// Implementing this trait enables:
/// - Discovery of available parameters
/// - Creation of detectors with custom parameter values
/// - Grid search optimization
pub trait ParameterizedDetector: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a detector with parameters from a HashMap
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Returns the pattern ID string
  fn pattern_id_str() -> &'static str;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
    return Err(PatternError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

/// Every parameterized builtin detector as (pattern id, parameter metadata)
pub fn all_param_meta() -> Vec<(&'static str, &'static [ParamMeta])> {
  use crate::detectors::*;

  fn entry<D: ParameterizedDetector>() -> (&'static str, &'static [ParamMeta]) {
    (D::pattern_id_str(), D::param_meta())
  }

  vec![
    entry::<HeadAndShouldersDetector>(),
    entry::<InverseHeadAndShouldersDetector>(),
    entry::<DoubleTopDetector>(),
    entry::<DoubleBottomDetector>(),
    entry::<TripleTopDetector>(),
    entry::<TripleBottomDetector>(),
    entry::<AscendingTriangleDetector>(),
    entry::<DescendingTriangleDetector>(),
    entry::<BullFlagDetector>(),
    entry::<BearFlagDetector>(),
    entry::<BullishEngulfingDetector>(),
    entry::<BearishEngulfingDetector>(),
    entry::<HammerDetector>(),
    entry::<ShootingStarDetector>(),
    entry::<DojiDetector>(),
    entry::<ResistanceLevelDetector>(),
    entry::<SupportLevelDetector>(),
  ]
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_ratio() {
    let meta = ParamMeta::ratio("test_ratio", 0.5, (0.3, 0.7, 0.1), "Test ratio parameter");

    assert_eq!(meta.name, "test_ratio");
    assert_eq!(meta.param_type, ParamType::Ratio);
    assert_eq!(meta.default, 0.5);
  }

  #[test]
  fn test_param_meta_period() {
    let meta = ParamMeta::period("test_period", 14.0, (10.0, 20.0, 2.0), "Test period parameter");

    assert_eq!(meta.name, "test_period");
    assert_eq!(meta.param_type, ParamType::Period);
    assert_eq!(meta.default, 14.0);
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::ratio("test", 0.5, (0.3, 0.7, 0.2), "Test");

    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.3).abs() < f64::EPSILON);
    assert!((grid[1] - 0.5).abs() < f64::EPSILON);
    assert!((grid[2] - 0.7).abs() < f64::EPSILON);
  }

  #[test]
  fn test_validate_ratio() {
    let meta = ParamMeta::ratio("test", 0.5, (0.3, 0.7, 0.1), "Test");

    assert!(meta.validate(0.5).is_ok());
    assert!(meta.validate(0.3).is_ok());
    assert!(meta.validate(0.7).is_ok());
    assert!(meta.validate(0.2).is_err());
    assert!(meta.validate(0.8).is_err());
  }

  #[test]
  fn test_validate_period() {
    let meta = ParamMeta::period("test", 14.0, (10.0, 20.0, 2.0), "Test");

    assert!(meta.validate(14.0).is_ok());
    assert!(meta.validate(10.0).is_ok());
    assert!(meta.validate(20.0).is_ok());
    assert!(meta.validate(8.0).is_err());
    assert!(meta.validate(22.0).is_err());
  }

  #[test]
  fn test_get_ratio_helper() {
    let mut params = HashMap::new();
    params.insert("key1", 0.8);

    assert!((get_ratio(&params, "key1", 0.5).unwrap().get() - 0.8).abs() < f64::EPSILON);
    assert!((get_ratio(&params, "key2", 0.5).unwrap().get() - 0.5).abs() < f64::EPSILON);
  }

  #[test]
  fn test_get_period_helper() {
    let mut params = HashMap::new();
    params.insert("key1", 20.0);

    assert_eq!(get_period(&params, "key1", 14).unwrap().get(), 20);
    assert_eq!(get_period(&params, "key2", 14).unwrap().get(), 14);

    params.insert("fractional", 2.5);
    assert!(get_period(&params, "fractional", 14).is_err());
  }

  #[test]
  fn test_defaults_match_detector_defaults() {
    use crate::detectors::*;

    let d = DoubleTopDetector::with_params(&HashMap::new()).unwrap();
    let default = DoubleTopDetector::default();
    assert_eq!(d.tolerance, default.tolerance);
    assert_eq!(d.min_pullback, default.min_pullback);

    let flag = BullFlagDetector::with_params(&HashMap::new()).unwrap();
    assert_eq!(flag.pole_length.get(), 20);
    assert_eq!(flag.slope_band, BullFlagDetector::default().slope_band);
  }

  #[test]
  fn test_with_params_overrides_and_validates() {
    use crate::detectors::*;

    let mut params = HashMap::new();
    params.insert("tolerance", 0.04);
    params.insert("min_touches", 3.0);
    let level = ResistanceLevelDetector::with_params(&params).unwrap();
    assert_eq!(level.tolerance.get(), 0.04);
    assert_eq!(level.min_touches.get(), 3);

    params.insert("percentile", 1.5);
    assert!(ResistanceLevelDetector::with_params(&params).is_err());
  }

  #[test]
  fn test_all_param_meta_defaults_in_range() {
    let all = all_param_meta();
    assert_eq!(all.len(), 17);
    for (id, metas) in all {
      assert!(crate::PatternId::from_name(id).is_some(), "{id}");
      for meta in metas {
        assert!(meta.validate(meta.default).is_ok(), "{id}.{}", meta.name);
        assert!(!meta.generate_grid().is_empty());
      }
    }
  }
}
