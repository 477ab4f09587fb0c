//! Data models for the asset health pipeline.
//!
//! Everything here is a plain value record: readings coming in, and the
//! twin states, health scores and alerts the engine produces. None of them
//! hold references back into history buffers, so they serialize as-is.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::round_to;
use crate::error::EngineError;

// ---

/// Sensor channels carried by a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameter {
    Temperature,
    Pressure,
    Vibration,
    Flow,
    Rpm,
}

impl Parameter {
    // ---
    pub const ALL: [Parameter; 5] = [
        Parameter::Temperature,
        Parameter::Pressure,
        Parameter::Vibration,
        Parameter::Flow,
        Parameter::Rpm,
    ];

    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            Parameter::Temperature => "temperature",
            Parameter::Pressure => "pressure",
            Parameter::Vibration => "vibration",
            Parameter::Flow => "flow",
            Parameter::Rpm => "rpm",
        }
    }

    /// Capitalized name used in alert messages.
    pub fn label(&self) -> &'static str {
        // ---
        match self {
            Parameter::Temperature => "Temperature",
            Parameter::Pressure => "Pressure",
            Parameter::Vibration => "Vibration",
            Parameter::Flow => "Flow",
            Parameter::Rpm => "Rpm",
        }
    }

    /// Accepted ingestion range `[min, max]`.
    pub fn valid_range(&self) -> (f64, f64) {
        // ---
        match self {
            Parameter::Temperature => (-50.0, 200.0),
            Parameter::Pressure => (0.0, 50.0),
            Parameter::Vibration => (0.0, 20.0),
            Parameter::Flow => (0.0, 1000.0),
            Parameter::Rpm => (0.0, 10000.0),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        Parameter::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| EngineError::UnknownParameter(s.to_string()))
    }
}

/// One optional value per sensor channel. An absent sensor is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SensorValues {
    // ---
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub vibration: Option<f64>,
    pub flow: Option<f64>,
    pub rpm: Option<f64>,
}

impl SensorValues {
    // ---
    pub fn get(&self, param: Parameter) -> Option<f64> {
        // ---
        match param {
            Parameter::Temperature => self.temperature,
            Parameter::Pressure => self.pressure,
            Parameter::Vibration => self.vibration,
            Parameter::Flow => self.flow,
            Parameter::Rpm => self.rpm,
        }
    }

    pub fn set(&mut self, param: Parameter, value: Option<f64>) {
        // ---
        let slot = match param {
            Parameter::Temperature => &mut self.temperature,
            Parameter::Pressure => &mut self.pressure,
            Parameter::Vibration => &mut self.vibration,
            Parameter::Flow => &mut self.flow,
            Parameter::Rpm => &mut self.rpm,
        };
        *slot = value;
    }

    /// Present channels in canonical parameter order.
    pub fn present(&self) -> impl Iterator<Item = (Parameter, f64)> + '_ {
        Parameter::ALL
            .into_iter()
            .filter_map(|p| self.get(p).map(|v| (p, v)))
    }
}

/// Equipment category. Parsed once at the ingestion boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    #[default]
    Pump,
    Compressor,
    HeatExchanger,
}

impl AssetType {
    // ---
    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            AssetType::Pump => "pump",
            AssetType::Compressor => "compressor",
            AssetType::HeatExchanger => "heat_exchanger",
        }
    }

    /// Resolve a stored type string, falling back to the default profile.
    ///
    /// Only for rows written before types were validated on the way in; new
    /// assets are rejected at creation instead.
    pub fn parse_or_default(raw: &str) -> AssetType {
        // ---
        raw.parse().unwrap_or_else(|e: EngineError| {
            tracing::warn!("{e}; scoring with the {} profile", AssetType::default());
            AssetType::default()
        })
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s {
            "pump" => Ok(AssetType::Pump),
            "compressor" => Ok(AssetType::Compressor),
            "heat_exchanger" => Ok(AssetType::HeatExchanger),
            other => Err(EngineError::UnknownAssetType(other.to_string())),
        }
    }
}

/// Raw reading as posted by a sensor gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSensorReading {
    // ---
    pub asset_id: i64,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub values: SensorValues,
    /// Operating load relative to nominal (1.0).
    pub load_factor: Option<f64>,
}

/// Validated, normalized reading bound to an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    // ---
    pub asset_id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub values: SensorValues,
}

impl Reading {
    /// Fractional UTC hour of the reading, used for the diurnal load cycle.
    pub fn time_of_day(&self) -> f64 {
        self.timestamp.hour() as f64 + self.timestamp.minute() as f64 / 60.0
    }
}

impl RawSensorReading {
    // ---
    /// Reject non-finite or out-of-range values and non-positive load.
    pub fn validate(&self) -> Result<(), EngineError> {
        // ---
        for (param, value) in self.values.present() {
            let (min, max) = param.valid_range();
            if !value.is_finite() {
                return Err(EngineError::InvalidReading(format!(
                    "{param} is not a finite number"
                )));
            }
            if value < min || value > max {
                return Err(EngineError::InvalidReading(format!(
                    "{param} out of range: {value} not in [{min}, {max}]"
                )));
            }
        }

        if let Some(load) = self.load_factor {
            if !load.is_finite() || load <= 0.0 {
                return Err(EngineError::InvalidReading(format!(
                    "load_factor must be positive, got {load}"
                )));
            }
        }
        Ok(())
    }

    /// Round values to 2 decimals and stamp missing timestamps with now.
    pub fn to_normalized(&self) -> Reading {
        // ---
        let mut values = SensorValues::default();
        for (param, value) in self.values.present() {
            values.set(param, Some(round_to(value, 2)));
        }

        Reading {
            asset_id: self.asset_id,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            values,
        }
    }
}

/// Reading as stored, with its row id.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredReading {
    // ---
    pub id: i64,
    pub asset_id: i64,
    pub timestamp: DateTime<Utc>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub values: SensorValues,
}

impl StoredReading {
    pub fn to_reading(&self) -> Reading {
        Reading {
            asset_id: self.asset_id,
            timestamp: self.timestamp,
            values: self.values,
        }
    }
}

/// One point of an asset's health-index history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthPoint {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Expected behavior of an asset at one instant, and how far off it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwinState {
    // ---
    pub asset_id: i64,
    pub timestamp: DateTime<Utc>,
    pub expected: SensorValues,
    /// 0-100, higher means further from expected.
    pub deviation_score: f64,
}

/// Fused health index plus the component scores that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HealthScore {
    // ---
    pub asset_id: i64,
    pub timestamp: DateTime<Utc>,
    /// 0-100, higher is healthier.
    pub health_index: f64,
    pub twin_deviation_score: f64,
    pub anomaly_score: f64,
    pub rul_days: Option<f64>,
    pub failure_risk_score: f64,
}

impl HealthScore {
    pub fn point(&self) -> HealthPoint {
        HealthPoint {
            value: self.health_index,
            timestamp: self.timestamp,
        }
    }
}

/// Rule family that raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Threshold,
    Health,
    Anomaly,
    Rul,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            AlertType::Threshold => "threshold",
            AlertType::Health => "health",
            AlertType::Anomaly => "anomaly",
            AlertType::Rul => "rul",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s {
            "threshold" => Ok(AlertType::Threshold),
            "health" => Ok(AlertType::Health),
            "anomaly" => Ok(AlertType::Anomaly),
            "rul" => Ok(AlertType::Rul),
            other => Err(EngineError::UnknownVariant(format!("alert type '{other}'"))),
        }
    }
}

/// Alert severity. Ordered so that `Critical > Warning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s {
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(EngineError::UnknownVariant(format!("severity '{other}'"))),
        }
    }
}

/// Persisted alert. Opens unresolved and is resolved at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    // ---
    pub id: Uuid,
    pub asset_id: i64,
    pub timestamp: DateTime<Utc>,
    pub alert_type: AlertType,
    pub parameter: Option<Parameter>,
    pub severity: Severity,
    pub message: String,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Registered piece of equipment.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Asset {
    // ---
    pub id: i64,
    pub name: String,
    pub asset_type: String,
    pub location: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Request body for registering an asset.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAsset {
    // ---
    pub name: String,
    pub asset_type: String,
    pub location: Option<String>,
}
