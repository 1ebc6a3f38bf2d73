//! Split conformal calibration of worker confidence scores.
//!
//! Historical non-conformity scores are reduced to a single threshold, the
//! `(n+1)(1-alpha)/n` empirical quantile taken with the "higher" rule. A new
//! score at or below the threshold is reliable at confidence `1 - alpha`.
//! Without calibration data the threshold is `+inf` and every score passes.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::twlog_debug;

/// Whether a prediction was judged against real calibration data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationStatus {
    Calibrated,
    Uncalibrated,
}

/// Historical scores and the threshold derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSet {
    scores: Vec<f64>,
    #[serde(with = "finite_or_null")]
    threshold: f64,
}

impl CalibrationSet {
    fn empty() -> Self {
        Self {
            scores: Vec::new(),
            threshold: f64::INFINITY,
        }
    }

    /// Scores in calibration order.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// A prediction annotated with its conformal reliability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedPrediction<T> {
    pub prediction: T,
    pub score: f64,
    #[serde(with = "finite_or_null")]
    pub threshold: f64,
    pub reliable: bool,
    pub confidence_level: f64,
    pub status: CalibrationStatus,
}

/// Conformal calibrator with a fixed miscoverage level `alpha`.
#[derive(Debug, Clone)]
pub struct ConformalCalibrator {
    alpha: f64,
    calibration: CalibrationSet,
}

impl ConformalCalibrator {
    /// Create an uncalibrated calibrator.
    ///
    /// # Errors
    /// Returns `Error::Validation` unless `0 < alpha < 1`.
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(Error::Validation(format!(
                "alpha must lie in (0, 1), got {}",
                alpha
            )));
        }
        Ok(Self {
            alpha,
            calibration: CalibrationSet::empty(),
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn threshold(&self) -> f64 {
        self.calibration.threshold
    }

    pub fn calibration_set(&self) -> &CalibrationSet {
        &self.calibration
    }

    pub fn is_calibrated(&self) -> bool {
        !self.calibration.is_empty()
    }

    /// Replace the calibration set and recompute the threshold.
    ///
    /// NaN and infinite scores are dropped. Never fails: an empty set leaves
    /// the calibrator uncalibrated.
    pub fn calibrate(&mut self, scores: &[f64]) {
        let scores: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
        let n = scores.len();
        if n == 0 {
            self.calibration = CalibrationSet::empty();
            twlog_debug!("calibrate: no scores, threshold=inf");
            return;
        }

        let level = ((n as f64 + 1.0) * (1.0 - self.alpha) / n as f64).clamp(0.0, 1.0);
        let mut sorted = scores.clone();
        sorted.sort_by(f64::total_cmp);
        let threshold = quantile_higher(&sorted, level);

        twlog_debug!(
            "calibrate: n={} alpha={} level={} threshold={}",
            n,
            self.alpha,
            level,
            threshold
        );
        self.calibration = CalibrationSet { scores, threshold };
    }

    /// Judge `score` against the current threshold.
    pub fn predict_with_interval<T>(&self, prediction: T, score: f64) -> CalibratedPrediction<T> {
        let threshold = self.calibration.threshold;
        CalibratedPrediction {
            prediction,
            score,
            threshold,
            reliable: score <= threshold,
            confidence_level: 1.0 - self.alpha,
            status: if self.is_calibrated() {
                CalibrationStatus::Calibrated
            } else {
                CalibrationStatus::Uncalibrated
            },
        }
    }
}

impl Default for ConformalCalibrator {
    /// Uncalibrated, `alpha = 0.05`.
    fn default() -> Self {
        Self {
            alpha: crate::config::DEFAULT_ALPHA,
            calibration: CalibrationSet::empty(),
        }
    }
}

/// Empirical quantile rounding up to the next observed value.
///
/// `sorted` must be non-empty and ascending; `level` in `[0, 1]`.
fn quantile_higher(sorted: &[f64], level: f64) -> f64 {
    let last = sorted.len() - 1;
    let position = level * last as f64;
    let index = (position.ceil() as usize).min(last);
    sorted[index]
}

/// JSON has no infinity; an infinite threshold travels as `null`.
mod finite_or_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}
