//! Static per-asset-type baselines and thresholds.
//!
//! Profiles are plain data, built once and only read afterwards. Every
//! scoring stage receives the resolved [`AssetProfile`] instead of looking
//! things up by type string.

use std::collections::HashMap;

use crate::models::{AssetType, Parameter};

// ---

/// Alert limits for one channel. For flow the limits are lower bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub warning: f64,
    pub critical: f64,
}

/// Baseline behavior and limits of one sensor channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterProfile {
    // ---
    pub mean: f64,
    pub std: f64,
    /// Alert limits, if this channel raises threshold alerts.
    pub limits: Option<Limits>,
    /// Value at which the equipment is considered failed, for RUL.
    pub failure: Option<f64>,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetProfile {
    // ---
    pub asset_type: AssetType,
    parameters: HashMap<Parameter, ParameterProfile>,
    /// Health index limits for health alerts.
    pub health_limits: Limits,
    /// Health index treated as failure for RUL.
    pub health_failure: f64,
}

impl AssetProfile {
    // ---
    pub fn parameter(&self, param: Parameter) -> Option<&ParameterProfile> {
        self.parameters.get(&param)
    }
}

/// Read-only lookup from asset type to profile.
#[derive(Debug, Clone)]
pub struct Registry {
    profiles: HashMap<AssetType, AssetProfile>,
}

impl Registry {
    // ---
    /// Profiles for the supported refinery equipment types.
    pub fn builtin() -> Self {
        // ---
        let profiles = [
            pump_profile(),
            compressor_profile(),
            heat_exchanger_profile(),
        ]
        .into_iter()
        .map(|p| (p.asset_type, p))
        .collect();

        Registry { profiles }
    }

    pub fn profile(&self, asset_type: AssetType) -> &AssetProfile {
        // ---
        // builtin() registers every AssetType variant
        &self.profiles[&asset_type]
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::builtin()
    }
}

const HEALTH_LIMITS: Limits = Limits {
    warning: 60.0,
    critical: 40.0,
};
const HEALTH_FAILURE: f64 = 30.0;

fn channel(
    param: Parameter,
    mean: f64,
    std: f64,
    limits: Option<(f64, f64)>,
    failure: Option<f64>,
) -> (Parameter, ParameterProfile) {
    // ---
    (
        param,
        ParameterProfile {
            mean,
            std,
            limits: limits.map(|(warning, critical)| Limits { warning, critical }),
            failure,
            weight: super::stats::parameter_weight(param),
        },
    )
}

fn pump_profile() -> AssetProfile {
    // ---
    AssetProfile {
        asset_type: AssetType::Pump,
        parameters: HashMap::from([
            channel(Parameter::Temperature, 65.0, 5.0, Some((75.0, 85.0)), Some(100.0)),
            channel(Parameter::Pressure, 2.5, 0.3, Some((3.2, 3.8)), Some(4.5)),
            channel(Parameter::Vibration, 2.5, 0.5, Some((4.0, 6.0)), Some(8.0)),
            channel(Parameter::Flow, 120.0, 15.0, Some((100.0, 80.0)), None),
            channel(Parameter::Rpm, 1450.0, 50.0, None, None),
        ]),
        health_limits: HEALTH_LIMITS,
        health_failure: HEALTH_FAILURE,
    }
}

fn compressor_profile() -> AssetProfile {
    // ---
    AssetProfile {
        asset_type: AssetType::Compressor,
        parameters: HashMap::from([
            channel(Parameter::Temperature, 85.0, 8.0, Some((100.0, 115.0)), Some(130.0)),
            channel(Parameter::Pressure, 8.5, 1.2, Some((10.0, 12.0)), Some(15.0)),
            channel(Parameter::Vibration, 3.5, 0.8, Some((5.5, 8.0)), Some(10.0)),
            channel(Parameter::Flow, 250.0, 30.0, Some((200.0, 150.0)), None),
            channel(Parameter::Rpm, 3600.0, 100.0, None, None),
        ]),
        health_limits: HEALTH_LIMITS,
        health_failure: HEALTH_FAILURE,
    }
}

fn heat_exchanger_profile() -> AssetProfile {
    // ---
    AssetProfile {
        asset_type: AssetType::HeatExchanger,
        parameters: HashMap::from([
            channel(Parameter::Temperature, 95.0, 10.0, Some((110.0, 125.0)), Some(150.0)),
            channel(Parameter::Pressure, 4.2, 0.5, Some((5.5, 6.5)), Some(8.0)),
            channel(Parameter::Vibration, 1.8, 0.4, Some((3.0, 5.0)), Some(6.0)),
            channel(Parameter::Flow, 180.0, 20.0, Some((150.0, 120.0)), None),
            // No rotating element
            channel(Parameter::Rpm, 0.0, 0.0, None, None),
        ]),
        health_limits: HEALTH_LIMITS,
        health_failure: HEALTH_FAILURE,
    }
}
