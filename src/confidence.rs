//! Confidence scoring.
//!
//! Maps how far a measurement clears its threshold onto a bounded score.
//! Every rule that grades its own evidence goes through here, so the
//! shaping method and the output bounds are set once in config.

use serde::Deserialize;

use crate::config::ConfidenceConfig;

/// Steepness of the sigmoid curve.
const SIGMOID_STEEPNESS: f64 = 6.0;

/// Default ideal-count multiple for count-based scores.
const DEFAULT_COUNT_SATURATION: f64 = 3.0;

/// Curve applied to the normalised distance above threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
    #[default]
    Linear,
    /// Squares the distance: near-threshold values are penalised.
    Exponential,
    /// Logistic curve with its inflection halfway to saturation.
    Sigmoid,
}

/// Pure confidence normaliser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceCalculator {
    method: ScoringMethod,
    min_confidence: f64,
    max_confidence: f64,
}

impl Default for ConfidenceCalculator {
    fn default() -> Self {
        Self::new(ScoringMethod::Linear, 0.0, 1.0)
    }
}

impl ConfidenceCalculator {
    pub fn new(method: ScoringMethod, min_confidence: f64, max_confidence: f64) -> Self {
        Self {
            method,
            min_confidence,
            max_confidence,
        }
    }

    pub fn from_config(config: &ConfidenceConfig) -> Self {
        Self::new(config.method, config.min_confidence, config.max_confidence)
    }

    pub fn method(&self) -> ScoringMethod {
        self.method
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Score `actual` against `threshold`, saturating at `saturation`.
    ///
    /// Returns the floor when `actual` does not reach the threshold. That is
    /// not a passing score: callers check their qualifying condition first
    /// and only call this to grade a label they are going to emit.
    pub fn score(&self, actual: f64, threshold: f64, saturation: f64) -> f64 {
        if actual < threshold {
            return self.min_confidence;
        }

        let normalized = if saturation <= threshold {
            1.0
        } else {
            (actual - threshold) / (saturation - threshold)
        };

        let shaped = match self.method {
            ScoringMethod::Linear => normalized.clamp(0.0, 1.0),
            ScoringMethod::Exponential => (normalized * normalized).clamp(0.0, 1.0),
            ScoringMethod::Sigmoid => {
                let x = normalized * 2.0 - 1.0;
                1.0 / (1.0 + (-SIGMOID_STEEPNESS * x).exp())
            }
        };

        self.clamp(shaped)
    }

    /// Score a fraction against a fractional threshold (saturates at 1.0).
    pub fn ratio(&self, ratio: f64, threshold: f64) -> f64 {
        self.score(ratio, threshold, 1.0)
    }

    /// Score a count against a minimum count.
    ///
    /// `ideal` defaults to three times the minimum.
    pub fn count(&self, count: u64, min_count: u64, ideal: Option<u64>) -> f64 {
        let min = min_count as f64;
        let ideal = ideal
            .map(|i| i as f64)
            .unwrap_or(min * DEFAULT_COUNT_SATURATION);
        self.score(count as f64, min, ideal)
    }

    /// Bound a hand-built confidence to the configured range.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min_confidence).min(self.max_confidence)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
