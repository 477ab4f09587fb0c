//! Remaining-useful-life estimation from degradation trends.
//!
//! Each signal (the health index, and every channel with a failure value)
//! gets a straight-line fit against elapsed days. The estimate is the most
//! urgent of the signals that point toward failure.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::profile::AssetProfile;
use super::stats::{round_to, LinearFit};
use crate::models::{HealthPoint, Parameter, Reading};

// ---

/// Most recent health points considered for the health trend.
pub const HEALTH_HISTORY_CAP: usize = 100;

/// Channel values closer than this share of the failure value are not extrapolated.
const EXTRAPOLATION_BAND: f64 = 0.7;

/// Health below which a rough estimate is given when no trend is usable.
const FALLBACK_HEALTH: f64 = 50.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// One value of a channel's time series.
pub type SeriesPoint = (f64, DateTime<Utc>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulEstimate {
    // ---
    /// Days until the most urgent signal reaches failure; `None` if nothing degrades.
    pub rul_days: Option<f64>,
    /// 0-100, higher is riskier.
    pub risk_score: f64,
    pub health_based: Option<f64>,
    pub param_based: BTreeMap<Parameter, f64>,
}

/// Which way a series moves toward failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increasing,
    Decreasing,
}

/// Channels extrapolated toward their failure value. All of them wear upward.
pub const TRENDED_PARAMETERS: [Parameter; 3] =
    [Parameter::Temperature, Parameter::Pressure, Parameter::Vibration];

/// Days elapsed since the first point, paired with each value.
fn elapsed_days(series: &[SeriesPoint]) -> Vec<(f64, f64)> {
    // ---
    let Some((_, first)) = series.first() else {
        return Vec::new();
    };
    series
        .iter()
        .map(|(value, ts)| {
            let days = (*ts - *first).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY;
            (days, *value)
        })
        .collect()
}

/// Fit the series and solve for the day it crosses `threshold`, counted from the last sample.
fn days_until(series: &[SeriesPoint], threshold: f64, direction: Direction) -> Option<f64> {
    // ---
    let points = elapsed_days(series);
    let fit = match LinearFit::fit(&points) {
        Ok(fit) => fit,
        Err(e) => {
            tracing::debug!("trend fit skipped: {e}");
            return None;
        }
    };

    let heading_to_failure = match direction {
        Direction::Increasing => fit.slope > 0.0,
        Direction::Decreasing => fit.slope < 0.0,
    };
    if !heading_to_failure {
        return None;
    }

    let crossing = fit.solve_for(threshold)?;
    let now = points.last().map(|(x, _)| *x).unwrap_or(0.0);
    Some((crossing - now).max(0.0))
}

/// RUL from the health-index trend. `None` when health is flat or improving.
pub fn health_based(history: &[HealthPoint], failure_threshold: f64) -> Option<f64> {
    // ---
    let recent = &history[history.len().saturating_sub(HEALTH_HISTORY_CAP)..];
    let series: Vec<SeriesPoint> = recent.iter().map(|h| (h.value, h.timestamp)).collect();
    days_until(&series, failure_threshold, Direction::Decreasing)
}

/// RUL from one channel's trend toward its failure value.
///
/// Already past the failure value gives 0. Too far from it to extrapolate,
/// trending away from it, or not a trended channel gives `None`.
pub fn parameter_based(series: &[SeriesPoint], failure_threshold: f64, param: Parameter) -> Option<f64> {
    // ---
    if !TRENDED_PARAMETERS.contains(&param) || series.len() < 3 {
        return None;
    }
    let (current, _) = *series.last()?;

    if current >= failure_threshold {
        return Some(0.0);
    }
    if current < failure_threshold * EXTRAPOLATION_BAND {
        return None;
    }

    days_until(series, failure_threshold, Direction::Increasing)
}

/// Map RUL onto a failure-risk score. No prediction counts as low risk.
pub fn risk_score(rul_days: Option<f64>) -> f64 {
    // ---
    match rul_days {
        None => 20.0,
        Some(d) if d <= 7.0 => 90.0,
        Some(d) if d <= 30.0 => 70.0,
        Some(d) if d <= 90.0 => 50.0,
        Some(_) => 30.0,
    }
}

/// Split time-ordered readings into one series per present channel.
pub fn parameter_histories(readings: &[Reading]) -> BTreeMap<Parameter, Vec<SeriesPoint>> {
    // ---
    let mut histories: BTreeMap<Parameter, Vec<SeriesPoint>> = BTreeMap::new();
    for reading in readings {
        for (param, value) in reading.values.present() {
            histories
                .entry(param)
                .or_default()
                .push((value, reading.timestamp));
        }
    }
    histories
}

/// Combine the health trend and every channel trend into one conservative estimate.
pub fn estimate(
    profile: &AssetProfile,
    health_history: &[HealthPoint],
    param_histories: &BTreeMap<Parameter, Vec<SeriesPoint>>,
) -> RulEstimate {
    // ---
    let health_rul = health_based(health_history, profile.health_failure);

    let param_rul: BTreeMap<Parameter, f64> = TRENDED_PARAMETERS
        .into_iter()
        .filter_map(|param| {
            let failure = profile.parameter(param)?.failure?;
            let series = param_histories.get(&param)?;
            parameter_based(series, failure, param).map(|d| (param, d))
        })
        .collect();

    // Risk maps the unrounded minimum; rounding is for reporting only
    let signals = health_rul.into_iter().chain(param_rul.values().copied());
    let raw_rul = match signals.reduce(f64::min) {
        Some(min) => Some(min),
        None => health_history
            .last()
            .filter(|h| h.value < FALLBACK_HEALTH)
            .map(|h| ((h.value - profile.health_failure) * 2.0).max(1.0)),
    };
    let rul_days = raw_rul.map(|d| round_to(d, 1));

    tracing::debug!(
        asset_type = %profile.asset_type,
        ?rul_days,
        ?health_rul,
        trended = param_rul.len(),
        "rul estimated"
    );

    RulEstimate {
        rul_days,
        risk_score: risk_score(raw_rul),
        health_based: health_rul.map(|d| round_to(d, 1)),
        param_based: param_rul.into_iter().map(|(p, d)| (p, round_to(d, 1))).collect(),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::engine::profile::Registry;
    use crate::models::{AssetType, SensorValues};
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn health(values: &[f64]) -> Vec<HealthPoint> {
        // ---
        values
            .iter()
            .enumerate()
            .map(|(i, v)| HealthPoint {
                value: *v,
                timestamp: day(i as i64),
            })
            .collect()
    }

    fn series(values: &[f64]) -> Vec<SeriesPoint> {
        values.iter().enumerate().map(|(i, v)| (*v, day(i as i64))).collect()
    }

    #[test]
    fn test_declining_health_predicts_failure() {
        // ---
        let rul = health_based(&health(&[80.0, 70.0, 60.0, 50.0, 40.0]), 30.0).unwrap();
        assert!(rul.is_finite() && rul > 0.0);
        assert!((rul - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_or_rising_health_predicts_nothing() {
        // ---
        assert_eq!(health_based(&health(&[70.0, 70.0, 70.0, 70.0]), 30.0), None);
        assert_eq!(health_based(&health(&[50.0, 60.0, 70.0]), 30.0), None);
        assert_eq!(health_based(&health(&[80.0, 70.0]), 30.0), None);
    }

    #[test]
    fn test_health_history_is_capped() {
        // ---
        // An old decline followed by 100 flat points: only the flat tail counts
        let mut values: Vec<f64> = (0..20).map(|i| 100.0 - i as f64 * 3.0).collect();
        values.extend(std::iter::repeat(60.0).take(HEALTH_HISTORY_CAP));
        assert_eq!(health_based(&health(&values), 30.0), None);
    }

    #[test]
    fn test_parameter_guard_bands() {
        // ---
        // Already at failure
        assert_eq!(parameter_based(&series(&[7.0, 7.5, 8.2]), 8.0, Parameter::Vibration), Some(0.0));
        // Too far below the failure value
        assert_eq!(parameter_based(&series(&[3.0, 4.0, 5.0]), 8.0, Parameter::Vibration), None);
        // Improving
        assert_eq!(parameter_based(&series(&[7.5, 7.0, 6.0]), 8.0, Parameter::Vibration), None);
        // Too short
        assert_eq!(parameter_based(&series(&[6.0, 7.0]), 8.0, Parameter::Vibration), None);
    }

    #[test]
    fn test_only_upward_wearing_channels_are_trended() {
        // ---
        // A falling flow series close to a low limit is still not extrapolated
        assert_eq!(parameter_based(&series(&[95.0, 90.0, 85.0]), 80.0, Parameter::Flow), None);
        assert_eq!(parameter_based(&series(&[1400.0, 1450.0, 1500.0]), 1600.0, Parameter::Rpm), None);
    }

    #[test]
    fn test_risk_uses_unrounded_estimate() {
        // ---
        let registry = Registry::builtin();
        let pump = registry.profile(AssetType::Pump);

        // Slope -5/day crosses 30 at day 9.04, which is 7.04 days after the last point
        let history = health(&[75.2, 70.2, 65.2]);
        let raw = health_based(&history, 30.0).unwrap();
        assert!((raw - 7.04).abs() < 1e-6);

        let estimate = estimate(pump, &history, &BTreeMap::new());
        assert_eq!(estimate.rul_days, Some(7.0));
        assert_eq!(estimate.health_based, Some(7.0));
        assert_eq!(estimate.risk_score, 70.0);
    }

    #[test]
    fn test_parameter_trend_crossing() {
        // ---
        let rul = parameter_based(&series(&[6.0, 6.5, 7.0]), 8.0, Parameter::Vibration).unwrap();
        assert!((rul - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_risk_buckets() {
        // ---
        assert_eq!(risk_score(None), 20.0);
        assert_eq!(risk_score(Some(0.0)), 90.0);
        assert_eq!(risk_score(Some(7.0)), 90.0);
        assert_eq!(risk_score(Some(7.1)), 70.0);
        assert_eq!(risk_score(Some(30.0)), 70.0);
        assert_eq!(risk_score(Some(90.0)), 50.0);
        assert_eq!(risk_score(Some(400.0)), 30.0);
    }

    #[test]
    fn test_estimate_takes_most_urgent_signal() {
        // ---
        let registry = Registry::builtin();
        let pump = registry.profile(AssetType::Pump);

        let readings: Vec<Reading> = [6.0, 6.5, 7.0, 7.5, 7.8]
            .iter()
            .enumerate()
            .map(|(i, v)| Reading {
                asset_id: 1,
                timestamp: day(i as i64),
                values: SensorValues {
                    vibration: Some(*v),
                    temperature: Some(65.0),
                    ..Default::default()
                },
            })
            .collect();
        let histories = parameter_histories(&readings);
        let health_history = health(&[90.0, 88.0, 86.0, 84.0, 82.0]);

        let estimate = estimate(pump, &health_history, &histories);
        let vibration = estimate.param_based[&Parameter::Vibration];
        let from_health = estimate.health_based.unwrap();

        // Temperature is far from its failure value and is not trended
        assert!(!estimate.param_based.contains_key(&Parameter::Temperature));
        assert_eq!(estimate.rul_days, Some(vibration.min(from_health)));
        assert!(estimate.rul_days.unwrap() <= vibration);
        assert!(estimate.rul_days.unwrap() <= from_health);
        assert_eq!(estimate.risk_score, risk_score(estimate.rul_days));
    }

    #[test]
    fn test_fallback_on_low_health_without_trend() {
        // ---
        let registry = Registry::builtin();
        let pump = registry.profile(AssetType::Pump);

        let low = estimate(pump, &health(&[45.0]), &BTreeMap::new());
        assert_eq!(low.rul_days, Some(30.0));
        assert_eq!(low.risk_score, 70.0);

        let failed = estimate(pump, &health(&[25.0]), &BTreeMap::new());
        assert_eq!(failed.rul_days, Some(1.0));

        let fine = estimate(pump, &health(&[85.0]), &BTreeMap::new());
        assert_eq!(fine.rul_days, None);
        assert_eq!(fine.risk_score, 20.0);

        let empty = estimate(pump, &[], &BTreeMap::new());
        assert_eq!(empty.rul_days, None);
    }

    #[test]
    fn test_estimate_is_repeatable() {
        // ---
        let registry = Registry::builtin();
        let compressor = registry.profile(AssetType::Compressor);
        let history = health(&[75.0, 72.0, 70.0, 66.0]);
        assert_eq!(
            estimate(compressor, &history, &BTreeMap::new()),
            estimate(compressor, &history, &BTreeMap::new())
        );
    }
}
