//! Digital twin: expected parameter values and deviation from them.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::profile::AssetProfile;
use super::stats::{round_to, sigma_score, weighted_mean};
use crate::error::EngineError;
use crate::models::{Parameter, Reading, SensorValues, TwinState};

// ---

const DAY_SHIFT_FACTOR: f64 = 1.10;
const NIGHT_SHIFT_FACTOR: f64 = 0.95;

/// Diurnal load multiplier. Hours 8 through 18 inclusive run hotter.
pub fn time_factor(time_of_day: Option<f64>) -> f64 {
    // ---
    match time_of_day {
        None => 1.0,
        Some(t) => {
            let hour = (t.floor() as i64).rem_euclid(24);
            if (8..=18).contains(&hour) {
                DAY_SHIFT_FACTOR
            } else {
                NIGHT_SHIFT_FACTOR
            }
        }
    }
}

/// Expected value of every channel under the given load and time of day.
///
/// A channel whose baseline mean is 0 (no rotating element, say) stays 0
/// whatever the multipliers.
pub fn expected_values(profile: &AssetProfile, load_factor: f64, time_of_day: Option<f64>) -> SensorValues {
    // ---
    let factor = load_factor * time_factor(time_of_day);
    let mut expected = SensorValues::default();

    for param in Parameter::ALL {
        if let Some(baseline) = profile.parameter(param) {
            let value = if baseline.mean == 0.0 {
                0.0
            } else {
                baseline.mean * factor
            };
            expected.set(param, Some(value));
        }
    }
    expected
}

/// Per-parameter deviation of `actual` from `expected`, each in [0, 100].
///
/// Absent channels and channels with zero baseline spread are left out.
pub fn parameter_deviations(
    actual: &SensorValues,
    expected: &SensorValues,
    profile: &AssetProfile,
) -> Vec<(Parameter, f64)> {
    // ---
    actual
        .present()
        .filter_map(|(param, value)| {
            let expected = expected.get(param)?;
            let baseline = profile.parameter(param)?;
            (baseline.std > 0.0).then(|| (param, sigma_score(value, expected, baseline.std)))
        })
        .collect()
}

/// Weighted deviation over the channels that could be scored; 0 if none.
pub fn deviation_score(actual: &SensorValues, expected: &SensorValues, profile: &AssetProfile) -> f64 {
    // ---
    let pairs: Vec<(f64, f64)> = parameter_deviations(actual, expected, profile)
        .into_iter()
        .filter_map(|(param, score)| profile.parameter(param).map(|b| (score, b.weight)))
        .collect();

    weighted_mean(&pairs)
}

/// Build the twin state for one reading.
pub fn twin_state(profile: &AssetProfile, reading: &Reading, load_factor: f64) -> TwinState {
    // ---
    let expected = expected_values(profile, load_factor, Some(reading.time_of_day()));
    let deviation = deviation_score(&reading.values, &expected, profile);

    tracing::debug!(
        asset_id = reading.asset_id,
        asset_type = %profile.asset_type,
        deviation,
        "twin deviation computed"
    );

    TwinState {
        asset_id: reading.asset_id,
        timestamp: reading.timestamp,
        expected,
        deviation_score: round_to(deviation, 2),
    }
}

/// Operating scenarios for what-if simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Baseline,
    LoadIncrease,
    LoadDecrease,
    TempSpike,
    PressureDrop,
}

impl FromStr for Scenario {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s {
            "baseline" => Ok(Scenario::Baseline),
            "load_increase" => Ok(Scenario::LoadIncrease),
            "load_decrease" => Ok(Scenario::LoadDecrease),
            "temp_spike" => Ok(Scenario::TempSpike),
            "pressure_drop" => Ok(Scenario::PressureDrop),
            other => Err(EngineError::UnknownVariant(format!("scenario '{other}'"))),
        }
    }
}

/// Expected values if the asset ran under `scenario`, ignoring time of day.
pub fn what_if(profile: &AssetProfile, scenario: Scenario, base_load: f64) -> SensorValues {
    // ---
    let scale = |values: &mut SensorValues, param: Parameter, by: f64| {
        values.set(param, values.get(param).map(|v| v * by));
    };

    match scenario {
        Scenario::Baseline => expected_values(profile, base_load, None),
        Scenario::LoadIncrease => expected_values(profile, base_load * 1.5, None),
        Scenario::LoadDecrease => expected_values(profile, base_load * 0.7, None),
        Scenario::TempSpike => {
            let mut expected = expected_values(profile, base_load, None);
            scale(&mut expected, Parameter::Temperature, 1.3);
            expected
        }
        Scenario::PressureDrop => {
            let mut expected = expected_values(profile, base_load, None);
            scale(&mut expected, Parameter::Pressure, 0.8);
            expected
        }
    }
}
