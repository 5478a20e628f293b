//! Analysis report returned by the service layer

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::provider::CandleRequest;
use crate::{rank_order, Direction, PatternMatch, OHLCV};

/// Confidence-weighted sums closer than this count as balanced
const BIAS_EPSILON: f64 = 1e-9;

/// Direction counts and overall bias of a match list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSummary {
    pub total: usize,
    pub bullish: usize,
    pub bearish: usize,
    pub neutral: usize,
    /// Sign of the confidence-weighted bullish minus bearish sum
    pub bias: Direction,
    /// Display name of the top-ranked match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strongest: Option<&'static str>,
}

impl PatternSummary {
    pub fn from_matches(matches: &[PatternMatch]) -> Self {
        let count = |d: Direction| matches.iter().filter(|m| m.direction == d).count();
        let weight = |d: Direction| {
            matches
                .iter()
                .filter(|m| m.direction == d)
                .map(|m| m.confidence)
                .sum::<f64>()
        };

        let balance = weight(Direction::Bullish) - weight(Direction::Bearish);
        let bias = if balance > BIAS_EPSILON {
            Direction::Bullish
        } else if balance < -BIAS_EPSILON {
            Direction::Bearish
        } else {
            Direction::Neutral
        };

        Self {
            total: matches.len(),
            bullish: count(Direction::Bullish),
            bearish: count(Direction::Bearish),
            neutral: count(Direction::Neutral),
            bias,
            strongest: matches.iter().min_by(|a, b| rank_order(a, b)).map(PatternMatch::name),
        }
    }
}

/// Ranked patterns for one instrument at one point in time
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub symbol: String,
    pub resolution: String,
    /// Close of the most recent bar
    pub current_price: Option<f64>,
    pub analyzed_at: DateTime<Utc>,
    pub candle_count: usize,
    pub summary: PatternSummary,
    pub patterns: Vec<PatternMatch>,
}

impl AnalysisReport {
    pub fn new<T: OHLCV>(
        request: &CandleRequest,
        bars: &[T],
        patterns: Vec<PatternMatch>,
        analyzed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: request.symbol.clone(),
            resolution: request.resolution.clone(),
            current_price: bars.last().map(|b| b.close()),
            analyzed_at,
            candle_count: bars.len(),
            summary: PatternSummary::from_matches(&patterns),
            patterns,
        }
    }

    /// Up to `n` matches with confidence strictly above `min_confidence`, in rank order
    pub fn top(&self, min_confidence: f64, n: usize) -> Vec<&PatternMatch> {
        self.patterns
            .iter()
            .filter(|m| m.confidence > min_confidence)
            .take(n)
            .collect()
    }

    pub fn by_direction(&self, direction: Direction) -> impl Iterator<Item = &PatternMatch> + '_ {
        self.patterns.iter().filter(move |m| m.direction == direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{flat, ts};
    use crate::{PatternCategory, PatternDetails, PatternId};

    fn matched(id: PatternId, confidence: f64, end_index: usize) -> PatternMatch {
        PatternMatch {
            pattern_id: id,
            category: id.category().unwrap(),
            direction: id.typical_direction().unwrap(),
            confidence,
            start_index: 0,
            end_index,
            start_date: ts(0),
            end_date: ts(end_index),
            details: PatternDetails::Level {
                level: 1.0,
                touches: 2,
            },
            description: String::new(),
        }
    }

    #[test]
    fn test_summary_counts_and_bias() {
        let matches = vec![
            matched(PatternId::DOUBLE_TOP, 0.75, 30),
            matched(PatternId::HAMMER, 0.65, 39),
            matched(PatternId::DOJI, 0.5, 38),
            matched(PatternId::BULL_FLAG, 0.65, 35),
        ];
        let summary = PatternSummary::from_matches(&matches);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.bullish, 2);
        assert_eq!(summary.bearish, 1);
        assert_eq!(summary.neutral, 1);
        assert_eq!(summary.bias, Direction::Bullish);
        assert_eq!(summary.strongest, Some("Double Top"));
    }

    #[test]
    fn test_empty_summary_is_neutral() {
        let summary = PatternSummary::from_matches(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.bias, Direction::Neutral);
        assert!(summary.strongest.is_none());
    }

    #[test]
    fn test_report_top_and_filters() {
        let bars = flat(40, 12.5);
        let request = CandleRequest::new("BTC-USD", "1d", 40);
        let patterns = vec![
            matched(PatternId::DOUBLE_TOP, 0.75, 30),
            matched(PatternId::RESISTANCE_LEVEL, 0.7, 39),
            matched(PatternId::DOJI, 0.5, 38),
        ];
        let report = AnalysisReport::new(&request, &bars, patterns, ts(40));

        assert_eq!(report.current_price, Some(12.5));
        assert_eq!(report.candle_count, 40);
        assert_eq!(report.top(0.6, 10).len(), 2);
        assert_eq!(report.top(0.6, 1)[0].pattern_id, PatternId::DOUBLE_TOP);
        assert_eq!(report.by_direction(Direction::Neutral).count(), 2);
        assert_eq!(report.summary.bearish, 1);
        assert!(report
            .patterns
            .iter()
            .any(|m| m.category == PatternCategory::SupportResistance));
    }
}
