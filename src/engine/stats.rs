//! Small numeric helpers shared by the scoring stages.

use crate::error::FitError;
use crate::models::Parameter;

// ---

/// Fixed importance of each channel when fusing per-parameter scores.
/// Temperature and pressure dominate.
pub const PARAMETER_WEIGHTS: [(Parameter, f64); 5] = [
    (Parameter::Temperature, 0.30),
    (Parameter::Pressure, 0.30),
    (Parameter::Vibration, 0.20),
    (Parameter::Flow, 0.15),
    (Parameter::Rpm, 0.05),
];

pub fn parameter_weight(param: Parameter) -> f64 {
    // ---
    PARAMETER_WEIGHTS
        .iter()
        .find(|(p, _)| *p == param)
        .map(|(_, w)| *w)
        .unwrap_or(0.0)
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn mean(values: &[f64]) -> Option<f64> {
    // ---
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by `n`).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    // ---
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Spread below this fraction of the magnitude is float noise, not variation.
const NEGLIGIBLE_SPREAD: f64 = 1e-9;

/// True when `sigma` is only rounding error around `center`.
///
/// A constant series of values that are not exact in binary (2.4, say)
/// yields a sigma near 1e-16 rather than 0.
pub fn negligible_spread(sigma: f64, center: f64) -> bool {
    sigma <= NEGLIGIBLE_SPREAD * center.abs().max(1.0)
}

/// `|value - center| / sigma` mapped onto 0-100, where 3 sigma saturates.
pub fn sigma_score(value: f64, center: f64, sigma: f64) -> f64 {
    // ---
    let z = (value - center).abs() / sigma;
    (z / 3.0 * 100.0).min(100.0)
}

/// Weighted mean over `(score, weight)` pairs that actually produced a score.
///
/// Weights renormalize over the pairs given, so an absent channel never
/// drags the result down. Empty input yields 0.
pub fn weighted_mean(pairs: &[(f64, f64)]) -> f64 {
    // ---
    if pairs.is_empty() {
        return 0.0;
    }
    let total_weight: f64 = pairs.iter().map(|(_, w)| w).sum();
    assert!(total_weight > 0.0, "parameter weights must be positive");

    pairs.iter().map(|(s, w)| s * w).sum::<f64>() / total_weight
}

/// Pair each parameter score with its entry in [`PARAMETER_WEIGHTS`].
pub fn with_default_weights(scores: &[(Parameter, f64)]) -> Vec<(f64, f64)> {
    scores
        .iter()
        .map(|(p, s)| (*s, parameter_weight(*p)))
        .collect()
}

/// Ordinary least-squares line `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    // ---
    /// Fit a line through `(x, y)` points. Needs 3 points and some spread in `x`.
    pub fn fit(points: &[(f64, f64)]) -> Result<LinearFit, FitError> {
        // ---
        if points.len() < 3 {
            return Err(FitError::InsufficientData {
                needed: 3,
                got: points.len(),
            });
        }

        let n = points.len() as f64;
        let x_mean = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let y_mean = points.iter().map(|(_, y)| y).sum::<f64>() / n;

        let sxx: f64 = points.iter().map(|(x, _)| (x - x_mean).powi(2)).sum();
        let sxy: f64 = points
            .iter()
            .map(|(x, y)| (x - x_mean) * (y - y_mean))
            .sum();

        if sxx == 0.0 || !sxx.is_finite() || !sxy.is_finite() {
            return Err(FitError::Degenerate);
        }

        let slope = sxy / sxx;
        Ok(LinearFit {
            slope,
            intercept: y_mean - slope * x_mean,
        })
    }

    /// `x` at which the line reaches `y`. `None` for a flat line.
    pub fn solve_for(&self, y: f64) -> Option<f64> {
        // ---
        if self.slope == 0.0 {
            return None;
        }
        let x = (y - self.intercept) / self.slope;
        x.is_finite().then_some(x)
    }
}
