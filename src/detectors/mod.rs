//! Chart pattern detectors
//!
//! # Pattern Categories
//!
//! - **Reversal (8)**: Head and Shoulders, Double/Triple Top/Bottom, Rising/Falling Wedge
//! - **Continuation (5)**: Ascending/Descending/Symmetrical Triangle, Bull/Bear Flag
//! - **Candlestick (5)**: Engulfing, Hammer, Shooting Star, Doji
//! - **Support/Resistance (2)**: percentile levels with touch counting
//!
//! Chart detectors read swing points from the shared [`crate::SeriesContext`];
//! candlestick and level detectors work on the bars directly.

pub mod extrema;
pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod candlestick;
pub mod continuation;
pub mod levels;
pub mod reversal;

// Re-export all detectors for convenience
pub use candlestick::*;
pub use continuation::*;
pub use extrema::*;
pub use helpers::*;
pub use levels::*;
pub use reversal::*;
