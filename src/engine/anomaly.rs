//! Anomaly detection of the current reading against recent history.
//!
//! Two interchangeable detectors implement [`AnomalyDetector`]: the
//! per-parameter z-score detector used by default, and the isolation forest
//! in [`super::isolation`].

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::isolation::IsolationForestDetector;
use super::stats::{
    mean, negligible_spread, round_to, sigma_score, std_dev, weighted_mean, with_default_weights,
};
use crate::error::{EngineError, FitError};
use crate::models::{Parameter, SensorValues};

// ---

/// Scores above this mark a parameter (or the fused score) as anomalous.
pub const ANOMALY_THRESHOLD: f64 = 70.0;

/// Fewest historical values a parameter needs before it is scored.
pub const MIN_HISTORY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Statistical,
    IsolationForest,
}

impl FromStr for DetectorKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s {
            "statistical" => Ok(DetectorKind::Statistical),
            "isolation_forest" => Ok(DetectorKind::IsolationForest),
            other => Err(EngineError::UnknownVariant(format!("anomaly method '{other}'"))),
        }
    }
}

/// Outcome of checking one reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    // ---
    pub is_anomaly: bool,
    /// Fused score, 0-100.
    pub anomaly_score: f64,
    pub anomalous_params: Vec<Parameter>,
    pub param_scores: BTreeMap<Parameter, f64>,
    pub method: DetectorKind,
}

impl AnomalyResult {
    pub fn normal(method: DetectorKind) -> Self {
        AnomalyResult {
            is_anomaly: false,
            anomaly_score: 0.0,
            anomalous_params: Vec::new(),
            param_scores: BTreeMap::new(),
            method,
        }
    }
}

/// Checks `current` against time-ordered `history` (oldest first).
pub trait AnomalyDetector: Send + Sync {
    fn detect(&self, history: &[SensorValues], current: &SensorValues) -> AnomalyResult;
}

pub fn detector_for(kind: DetectorKind) -> Box<dyn AnomalyDetector> {
    // ---
    match kind {
        DetectorKind::Statistical => Box::new(StatisticalDetector),
        DetectorKind::IsolationForest => Box::new(IsolationForestDetector::default()),
    }
}

/// Per-parameter z-score detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticalDetector;

impl StatisticalDetector {
    // ---
    /// Score one value against its history, 3 sigma saturating at 100.
    pub fn parameter_score(history: &[f64], current: f64) -> Result<f64, FitError> {
        // ---
        if history.len() < MIN_HISTORY {
            return Err(FitError::InsufficientData {
                needed: MIN_HISTORY,
                got: history.len(),
            });
        }
        let (Some(center), Some(sigma)) = (mean(history), std_dev(history)) else {
            return Err(FitError::Degenerate);
        };
        if negligible_spread(sigma, center) {
            return Err(FitError::Degenerate);
        }
        Ok(sigma_score(current, center, sigma))
    }
}

impl AnomalyDetector for StatisticalDetector {
    fn detect(&self, history: &[SensorValues], current: &SensorValues) -> AnomalyResult {
        // ---
        let mut param_scores = BTreeMap::new();

        for (param, value) in current.present() {
            let past: Vec<f64> = history.iter().filter_map(|r| r.get(param)).collect();
            match Self::parameter_score(&past, value) {
                Ok(score) => {
                    param_scores.insert(param, score);
                }
                Err(e) => tracing::debug!(%param, "anomaly score skipped: {e}"),
            }
        }

        let anomalous_params: Vec<Parameter> = param_scores
            .iter()
            .filter(|(_, score)| **score > ANOMALY_THRESHOLD)
            .map(|(param, _)| *param)
            .collect();

        let scored: Vec<(Parameter, f64)> = param_scores.iter().map(|(p, s)| (*p, *s)).collect();
        let fused = weighted_mean(&with_default_weights(&scored));

        AnomalyResult {
            is_anomaly: fused > ANOMALY_THRESHOLD || !anomalous_params.is_empty(),
            anomaly_score: round_to(fused, 2),
            anomalous_params,
            param_scores,
            method: DetectorKind::Statistical,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn temps(values: &[f64]) -> Vec<SensorValues> {
        // ---
        values
            .iter()
            .map(|t| SensorValues {
                temperature: Some(*t),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_temperature_spike_saturates() {
        // ---
        let history = temps(&[64.0, 65.0, 66.0, 65.0, 64.5, 65.5, 64.0, 66.0, 65.0, 65.0]);
        let current = SensorValues {
            temperature: Some(85.0),
            ..Default::default()
        };

        let result = StatisticalDetector.detect(&history, &current);
        assert_eq!(result.anomaly_score, 100.0);
        assert!(result.is_anomaly);
        assert_eq!(result.anomalous_params, vec![Parameter::Temperature]);
    }

    #[test]
    fn test_in_band_reading_is_normal() {
        // ---
        let history = temps(&[64.0, 66.0, 64.0, 66.0, 64.0, 66.0]);
        let current = SensorValues {
            temperature: Some(65.0),
            ..Default::default()
        };

        let result = StatisticalDetector.detect(&history, &current);
        assert_eq!(result.anomaly_score, 0.0);
        assert!(!result.is_anomaly);
    }

    #[test]
    fn test_short_or_flat_history_skips_parameter() {
        // ---
        let current = SensorValues {
            temperature: Some(90.0),
            ..Default::default()
        };

        let short = StatisticalDetector.detect(&temps(&[65.0, 66.0]), &current);
        assert!(short.param_scores.is_empty());
        assert_eq!(short.anomaly_score, 0.0);
        assert!(!short.is_anomaly);

        let flat = StatisticalDetector.detect(&temps(&[65.0, 65.0, 65.0, 65.0]), &current);
        assert!(flat.param_scores.is_empty());
    }

    #[test]
    fn test_constant_inexact_history_is_degenerate() {
        // ---
        // 2.4 has no exact binary form, so its std comes out near 4e-16, not 0
        let history: Vec<SensorValues> = (0..20)
            .map(|_| SensorValues {
                pressure: Some(2.4),
                ..Default::default()
            })
            .collect();

        for pressure in [2.4, 2.41] {
            let current = SensorValues {
                pressure: Some(pressure),
                ..Default::default()
            };
            let result = StatisticalDetector.detect(&history, &current);
            assert!(result.param_scores.is_empty(), "pressure {pressure} scored: {:?}", result.param_scores);
            assert_eq!(result.anomaly_score, 0.0);
            assert!(!result.is_anomaly);
        }

        let pressures: Vec<f64> = history.iter().filter_map(|v| v.pressure).collect();
        assert_eq!(
            StatisticalDetector::parameter_score(&pressures, 2.4),
            Err(FitError::Degenerate)
        );
    }

    #[test]
    fn test_skipped_parameter_does_not_dilute_fusion() {
        // ---
        // Pressure has a flat history and is skipped; temperature alone decides
        let history: Vec<SensorValues> = [64.0, 66.0, 64.0, 66.0]
            .iter()
            .map(|t| SensorValues {
                temperature: Some(*t),
                pressure: Some(2.5),
                ..Default::default()
            })
            .collect();
        let current = SensorValues {
            temperature: Some(80.0),
            pressure: Some(2.5),
            ..Default::default()
        };

        let result = StatisticalDetector.detect(&history, &current);
        assert_eq!(result.param_scores.len(), 1);
        assert_eq!(result.anomaly_score, 100.0);
    }

    #[test]
    fn test_low_weight_spike_flags_without_high_fused_score() {
        // ---
        let history: Vec<SensorValues> = [(64.0, 1440.0), (66.0, 1460.0), (64.0, 1440.0), (66.0, 1460.0)]
            .iter()
            .map(|(t, rpm)| SensorValues {
                temperature: Some(*t),
                rpm: Some(*rpm),
                ..Default::default()
            })
            .collect();
        let current = SensorValues {
            temperature: Some(65.0),
            rpm: Some(1700.0),
            ..Default::default()
        };

        let result = StatisticalDetector.detect(&history, &current);
        assert_eq!(result.anomalous_params, vec![Parameter::Rpm]);
        assert!(result.anomaly_score < ANOMALY_THRESHOLD);
        assert!(result.is_anomaly);
    }

    #[test]
    fn test_detect_is_repeatable() {
        // ---
        let history = temps(&[60.0, 62.0, 61.0, 63.0, 60.5]);
        let current = SensorValues {
            temperature: Some(64.0),
            ..Default::default()
        };
        assert_eq!(
            StatisticalDetector.detect(&history, &current),
            StatisticalDetector.detect(&history, &current)
        );
    }

    #[test]
    fn test_detector_kind_parsing() {
        // ---
        assert_eq!("isolation_forest".parse::<DetectorKind>(), Ok(DetectorKind::IsolationForest));
        assert!("lof".parse::<DetectorKind>().is_err());
    }
}
