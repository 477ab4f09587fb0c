//! Fuses the component scores into a single 0-100 health index.

use super::stats::round_to;

// ---

const TWIN_WEIGHT: f64 = 0.30;
const ANOMALY_WEIGHT: f64 = 0.30;
const RUL_WEIGHT: f64 = 0.25;
const RISK_WEIGHT: f64 = 0.15;

/// Goodness of a remaining-life estimate. No estimate is neutral.
pub fn rul_health(rul_days: Option<f64>) -> f64 {
    // ---
    match rul_days {
        None => 70.0,
        Some(d) if d <= 7.0 => 20.0,
        Some(d) if d <= 30.0 => 40.0,
        Some(d) if d <= 90.0 => 60.0,
        Some(d) if d <= 180.0 => 80.0,
        Some(_) => 95.0,
    }
}

/// Health index from twin deviation, anomaly score, RUL and failure risk.
///
/// Every input always has a goodness value, so all four weights apply.
pub fn fuse(twin_deviation: f64, anomaly_score: f64, rul_days: Option<f64>, risk_score: f64) -> f64 {
    // ---
    let twin = (100.0 - twin_deviation).max(0.0);
    let anomaly = (100.0 - anomaly_score).max(0.0);
    let risk = (100.0 - risk_score).max(0.0);

    let index = twin * TWIN_WEIGHT
        + anomaly * ANOMALY_WEIGHT
        + rul_health(rul_days) * RUL_WEIGHT
        + risk * RISK_WEIGHT;

    round_to(index.clamp(0.0, 100.0), 2)
}
