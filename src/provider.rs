//! Candle data source abstraction and retry policy

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::{Candle, Period};

/// Which candles to fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandleRequest {
    /// Instrument symbol (e.g. "AAPL", "BTC-USD")
    pub symbol: String,
    /// Bar resolution (e.g. "1d", "1h")
    pub resolution: String,
    /// Number of most recent bars
    pub count: usize,
}

impl CandleRequest {
    pub fn new(symbol: impl Into<String>, resolution: impl Into<String>, count: usize) -> Self {
        Self {
            symbol: symbol.into(),
            resolution: resolution.into(),
            count,
        }
    }
}

/// Upstream data errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Malformed upstream data: {0}")]
    Malformed(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        last: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::Unavailable(_) | ProviderError::Timeout(_)
        )
    }
}

/// Source of OHLCV candles, oldest first
pub trait CandleProvider: Send + Sync {
    fn fetch(&self, request: &CandleRequest) -> Result<Vec<Candle>, ProviderError>;
}

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    None,
    Fixed(Duration),
    /// `base * 2^(attempt-1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the given failed attempt (1-based)
    pub fn delay(&self, attempt: usize) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let shift = attempt.saturating_sub(1).min(16) as u32;
                base.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

/// Bounded retry of retryable provider errors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: Period,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Period::new_const(3),
            backoff: Backoff::Exponential {
                base: Duration::from_millis(500),
                max: Duration::from_secs(5),
            },
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retry
    pub fn none() -> Self {
        Self {
            max_attempts: Period::new_const(1),
            backoff: Backoff::None,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. `op` receives the 1-based attempt number.
    pub fn run<T, F>(&self, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut(usize) -> Result<T, ProviderError>,
    {
        let max_attempts = self.max_attempts.get();
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) if attempt >= max_attempts => {
                    return Err(ProviderError::Exhausted {
                        attempts: attempt,
                        last: Box::new(error),
                    })
                }
                Err(error) => {
                    let delay = self.backoff.delay(attempt);
                    warn!(attempt, max_attempts, %error, ?delay, "candle fetch failed, retrying");
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts: Period::new(attempts).unwrap(),
            backoff: Backoff::None,
        }
    }

    #[test]
    fn test_retries_transient_errors() {
        let result = policy(3).run(|attempt| {
            if attempt < 3 {
                Err(ProviderError::RateLimited)
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn test_permanent_error_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = policy(5).run(|_| {
            calls += 1;
            Err(ProviderError::UnknownSymbol("ZZZZ".into()))
        });
        assert_eq!(calls, 1);
        assert_eq!(result, Err(ProviderError::UnknownSymbol("ZZZZ".into())));
    }

    #[test]
    fn test_exhausted_reports_last_error() {
        let mut calls = 0;
        let result: Result<(), _> = policy(2).run(|_| {
            calls += 1;
            Err(ProviderError::Timeout("upstream".into()))
        });
        assert_eq!(calls, 2);
        match result {
            Err(ProviderError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(last.is_retryable());
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(350),
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(350));
        assert_eq!(backoff.delay(60), Duration::from_millis(350));
        assert_eq!(Backoff::None.delay(4), Duration::ZERO);
    }
}
