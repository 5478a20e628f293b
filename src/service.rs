//! Pattern analysis service
//!
//! Ties a [`CandleProvider`] to a [`PatternEngine`]: fetch with retry, scan,
//! wrap the matches in an [`AnalysisReport`], and optionally cache the report
//! per request.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::cache::AnalysisCache;
use crate::provider::{CandleProvider, CandleRequest, RetryPolicy};
use crate::report::AnalysisReport;
use crate::{ContextProvider, DefaultContextProvider, EngineBuilder, PatternEngine, Result};

/// Cache of finished reports keyed by request
pub type ReportCache = dyn AnalysisCache<CandleRequest, Arc<AnalysisReport>>;

pub struct PatternAnalyzer<P: CandleProvider, C: ContextProvider = DefaultContextProvider> {
    engine: PatternEngine<C>,
    provider: P,
    cache: Option<Arc<ReportCache>>,
    retry: RetryPolicy,
}

impl<P: CandleProvider> PatternAnalyzer<P> {
    /// Analyzer over the default engine with every builtin detector
    pub fn new(provider: P) -> Result<Self> {
        let engine = EngineBuilder::new().with_all_defaults().build()?;
        Ok(Self::with_engine(engine, provider))
    }
}

impl<P: CandleProvider, C: ContextProvider> PatternAnalyzer<P, C> {
    pub fn with_engine(engine: PatternEngine<C>, provider: P) -> Self {
        Self {
            engine,
            provider,
            cache: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn cache(mut self, cache: Arc<ReportCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn engine(&self) -> &PatternEngine<C> {
        &self.engine
    }

    /// Fetch, scan and report. Cached reports are returned without refetching.
    pub fn analyze(&self, request: &CandleRequest) -> Result<Arc<AnalysisReport>> {
        if let Some(report) = self.cache.as_ref().and_then(|c| c.get(request)) {
            debug!(symbol = %request.symbol, resolution = %request.resolution, "cache hit");
            return Ok(report);
        }

        let candles = self.retry.run(|attempt| {
            debug!(symbol = %request.symbol, attempt, "fetching candles");
            self.provider.fetch(request)
        })?;
        let patterns = self.engine.scan(&candles)?;

        info!(
            symbol = %request.symbol,
            resolution = %request.resolution,
            candles = candles.len(),
            patterns = patterns.len(),
            "analysis complete"
        );

        let report = Arc::new(AnalysisReport::new(request, &candles, patterns, Utc::now()));
        if let Some(cache) = &self.cache {
            cache.insert(request.clone(), Arc::clone(&report));
        }
        Ok(report)
    }

    /// Drop the cached report for `request`. Returns true when one was present.
    pub fn invalidate(&self, request: &CandleRequest) -> bool {
        self.cache.as_ref().is_some_and(|c| c.invalidate(request))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::cache::TtlCache;
    use crate::provider::{Backoff, ProviderError};
    use crate::test_support::flat;
    use crate::{Candle, PatternError, Period};

    struct StubProvider {
        calls: AtomicUsize,
        failures_before_success: usize,
        candles: Vec<Candle>,
    }

    impl StubProvider {
        fn new(candles: Vec<Candle>, failures_before_success: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures_before_success,
                candles,
            }
        }
    }

    impl CandleProvider for StubProvider {
        fn fetch(&self, request: &CandleRequest) -> std::result::Result<Vec<Candle>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if request.symbol == "MISSING" {
                return Err(ProviderError::UnknownSymbol(request.symbol.clone()));
            }
            if call < self.failures_before_success {
                return Err(ProviderError::Unavailable("warming up".into()));
            }
            Ok(self.candles.clone())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: Period::new(3).unwrap(),
            backoff: Backoff::None,
        }
    }

    #[test]
    fn test_analyze_builds_report() {
        let analyzer = PatternAnalyzer::new(StubProvider::new(flat(30, 42.0), 0)).unwrap();
        let report = analyzer.analyze(&CandleRequest::new("AAPL", "1d", 30)).unwrap();
        assert_eq!(report.symbol, "AAPL");
        assert_eq!(report.current_price, Some(42.0));
        assert_eq!(report.candle_count, 30);
        assert_eq!(report.summary.total, report.patterns.len());
    }

    #[test]
    fn test_cache_hit_skips_provider() {
        let cache: Arc<ReportCache> = Arc::new(TtlCache::<CandleRequest, Arc<AnalysisReport>>::new(
            Duration::from_secs(60),
        ));
        let analyzer = PatternAnalyzer::new(StubProvider::new(flat(30, 42.0), 0))
            .unwrap()
            .cache(cache);
        let request = CandleRequest::new("AAPL", "1d", 30);

        let first = analyzer.analyze(&request).unwrap();
        let second = analyzer.analyze(&request).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(analyzer.provider.calls.load(Ordering::SeqCst), 1);

        assert!(analyzer.invalidate(&request));
        analyzer.analyze(&request).unwrap();
        assert_eq!(analyzer.provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let analyzer = PatternAnalyzer::new(StubProvider::new(flat(30, 42.0), 2))
            .unwrap()
            .retry_policy(fast_retry());
        assert!(analyzer.analyze(&CandleRequest::new("AAPL", "1d", 30)).is_ok());
        assert_eq!(analyzer.provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_provider_error_surfaces() {
        let analyzer = PatternAnalyzer::new(StubProvider::new(flat(30, 42.0), 0))
            .unwrap()
            .retry_policy(fast_retry());
        match analyzer.analyze(&CandleRequest::new("MISSING", "1d", 30)) {
            Err(PatternError::Provider(ProviderError::UnknownSymbol(symbol))) => {
                assert_eq!(symbol, "MISSING")
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }
}
