//! Alert rules and open-alert deduplication.
//!
//! Four rule families (threshold, health, anomaly, RUL) each turn the
//! current scores into at most one [`Firing`] per key. A firing only opens a
//! new alert when no unresolved alert with the same [`AlertKey`] exists; a
//! firing at a higher severity upgrades the open alert in place.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::anomaly::ANOMALY_THRESHOLD;
use super::profile::AssetProfile;
use crate::models::{Alert, AlertType, Parameter, SensorValues, Severity};

// ---

const ANOMALY_CRITICAL: f64 = 85.0;
const RUL_WARNING_DAYS: f64 = 30.0;
const RUL_CRITICAL_DAYS: f64 = 7.0;

/// Identity of an alert condition. At most one unresolved alert per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub asset_id: i64,
    pub alert_type: AlertType,
    pub parameter: Option<Parameter>,
}

impl Alert {
    pub fn key(&self) -> AlertKey {
        AlertKey {
            asset_id: self.asset_id,
            alert_type: self.alert_type,
            parameter: self.parameter,
        }
    }
}

/// Open-alert state the engine deduplicates against.
pub trait AlertStore {
    /// The unresolved alert for `key`, if any.
    fn find_open(&self, key: &AlertKey) -> Option<Alert>;

    fn insert(&mut self, alert: Alert);

    fn escalate(&mut self, id: Uuid, severity: Severity, message: &str);
}

/// A rule that fired for the current reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    // ---
    pub alert_type: AlertType,
    pub parameter: Option<Parameter>,
    pub severity: Severity,
    pub message: String,
}

/// What applying a firing did to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    Opened(Alert),
    Escalated(Alert),
    Suppressed,
}

/// Threshold rule: high values are bad, except flow where low values are.
pub fn threshold_firings(profile: &AssetProfile, values: &SensorValues) -> Vec<Firing> {
    // ---
    values
        .present()
        .filter_map(|(param, value)| {
            let limits = profile.parameter(param)?.limits?;
            let label = param.label();

            let (severity, message) = if param == Parameter::Flow {
                if value <= limits.critical {
                    (Severity::Critical, format!("{label} critically low: {value} (threshold: {})", limits.critical))
                } else if value <= limits.warning {
                    (Severity::Warning, format!("{label} low: {value} (threshold: {})", limits.warning))
                } else {
                    return None;
                }
            } else if value >= limits.critical {
                (Severity::Critical, format!("{label} critically high: {value} (threshold: {})", limits.critical))
            } else if value >= limits.warning {
                (Severity::Warning, format!("{label} high: {value} (threshold: {})", limits.warning))
            } else {
                return None;
            };

            Some(Firing {
                alert_type: AlertType::Threshold,
                parameter: Some(param),
                severity,
                message,
            })
        })
        .collect()
}

pub fn health_firing(profile: &AssetProfile, health_index: f64) -> Option<Firing> {
    // ---
    let limits = profile.health_limits;
    let (severity, message) = if health_index <= limits.critical {
        (Severity::Critical, format!("Health index critically low: {health_index:.1}"))
    } else if health_index <= limits.warning {
        (Severity::Warning, format!("Health index low: {health_index:.1}"))
    } else {
        return None;
    };

    Some(Firing {
        alert_type: AlertType::Health,
        parameter: None,
        severity,
        message,
    })
}

pub fn anomaly_firing(anomaly_score: f64) -> Option<Firing> {
    // ---
    if anomaly_score <= ANOMALY_THRESHOLD {
        return None;
    }
    let severity = if anomaly_score >= ANOMALY_CRITICAL {
        Severity::Critical
    } else {
        Severity::Warning
    };

    Some(Firing {
        alert_type: AlertType::Anomaly,
        parameter: None,
        severity,
        message: format!("Anomaly detected: score {anomaly_score:.1}"),
    })
}

pub fn rul_firing(rul_days: Option<f64>) -> Option<Firing> {
    // ---
    let days = rul_days?;
    let (severity, message) = if days <= RUL_CRITICAL_DAYS {
        (Severity::Critical, format!("Critical: Estimated RUL only {days:.1} days remaining"))
    } else if days <= RUL_WARNING_DAYS {
        (Severity::Warning, format!("Warning: Estimated RUL {days:.1} days remaining"))
    } else {
        return None;
    };

    Some(Firing {
        alert_type: AlertType::Rul,
        parameter: None,
        severity,
        message,
    })
}

/// Apply one firing against the open-alert state.
pub fn apply<S: AlertStore + ?Sized>(
    store: &mut S,
    asset_id: i64,
    timestamp: DateTime<Utc>,
    firing: Firing,
) -> AlertOutcome {
    // ---
    let key = AlertKey {
        asset_id,
        alert_type: firing.alert_type,
        parameter: firing.parameter,
    };

    match store.find_open(&key) {
        Some(open) if firing.severity > open.severity => {
            store.escalate(open.id, firing.severity, &firing.message);
            tracing::info!(
                asset_id,
                alert_id = %open.id,
                alert_type = %firing.alert_type,
                from = %open.severity,
                to = %firing.severity,
                "alert escalated"
            );
            AlertOutcome::Escalated(Alert {
                severity: firing.severity,
                message: firing.message,
                ..open
            })
        }
        Some(open) => {
            tracing::debug!(asset_id, alert_id = %open.id, alert_type = %firing.alert_type, "alert already open");
            AlertOutcome::Suppressed
        }
        None => {
            let alert = Alert {
                id: Uuid::new_v4(),
                asset_id,
                timestamp,
                alert_type: firing.alert_type,
                parameter: firing.parameter,
                severity: firing.severity,
                message: firing.message,
                resolved: false,
                resolved_at: None,
            };
            tracing::info!(
                asset_id,
                alert_id = %alert.id,
                alert_type = %alert.alert_type,
                severity = %alert.severity,
                "{}",
                alert.message
            );
            store.insert(alert.clone());
            AlertOutcome::Opened(alert)
        }
    }
}

/// Alerts held in memory. Also used as the per-pass snapshot of a database's open alerts.
#[derive(Debug, Clone, Default)]
pub struct MemoryAlertStore {
    alerts: Vec<Alert>,
}

impl MemoryAlertStore {
    // ---
    pub fn from_alerts(alerts: Vec<Alert>) -> Self {
        MemoryAlertStore { alerts }
    }

    pub fn open(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|a| !a.resolved)
    }
}

// Resolution goes through the database in the service
#[cfg(test)]
impl MemoryAlertStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> &[Alert] {
        &self.alerts
    }

    /// Mark an alert resolved. Returns it, or `None` if unknown or already resolved.
    pub fn resolve(&mut self, id: Uuid, at: DateTime<Utc>) -> Option<Alert> {
        // ---
        let alert = self.alerts.iter_mut().find(|a| a.id == id && !a.resolved)?;
        alert.resolved = true;
        alert.resolved_at = Some(at);
        Some(alert.clone())
    }
}

impl AlertStore for MemoryAlertStore {
    fn find_open(&self, key: &AlertKey) -> Option<Alert> {
        self.open().find(|a| a.key() == *key).cloned()
    }

    fn insert(&mut self, alert: Alert) {
        self.alerts.push(alert);
    }

    fn escalate(&mut self, id: Uuid, severity: Severity, message: &str) {
        // ---
        if let Some(alert) = self.alerts.iter_mut().find(|a| a.id == id) {
            alert.severity = severity;
            alert.message = message.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::engine::profile::Registry;
    use crate::models::AssetType;

    fn flow(value: f64) -> SensorValues {
        SensorValues {
            flow: Some(value),
            ..Default::default()
        }
    }

    fn fire_all(store: &mut MemoryAlertStore, firings: Vec<Firing>) -> Vec<AlertOutcome> {
        // ---
        firings
            .into_iter()
            .map(|f| apply(store, 1, Utc::now(), f))
            .collect()
    }

    #[test]
    fn test_low_flow_is_critical_and_deduplicated() {
        // ---
        let registry = Registry::builtin();
        let pump = registry.profile(AssetType::Pump);
        let mut store = MemoryAlertStore::new();

        let first = fire_all(&mut store, threshold_firings(pump, &flow(70.0)));
        assert_eq!(first.len(), 1);
        let AlertOutcome::Opened(alert) = &first[0] else {
            panic!("expected a new alert, got {:?}", first[0]);
        };
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.parameter, Some(Parameter::Flow));
        assert!(alert.message.contains("Flow critically low"));

        let second = fire_all(&mut store, threshold_firings(pump, &flow(70.0)));
        assert_eq!(second, vec![AlertOutcome::Suppressed]);
        assert_eq!(store.open().count(), 1);
    }

    #[test]
    fn test_threshold_directions() {
        // ---
        let registry = Registry::builtin();
        let pump = registry.profile(AssetType::Pump);

        assert!(threshold_firings(pump, &flow(120.0)).is_empty());
        assert_eq!(threshold_firings(pump, &flow(100.0))[0].severity, Severity::Warning);

        let hot = SensorValues {
            temperature: Some(75.0),
            vibration: Some(6.5),
            rpm: Some(9000.0),
            ..Default::default()
        };
        let firings = threshold_firings(pump, &hot);
        // rpm has no limits
        assert_eq!(firings.len(), 2);
        assert_eq!(firings[0].parameter, Some(Parameter::Temperature));
        assert_eq!(firings[0].severity, Severity::Warning);
        assert_eq!(firings[1].parameter, Some(Parameter::Vibration));
        assert_eq!(firings[1].severity, Severity::Critical);
    }

    #[test]
    fn test_threshold_keys_are_per_parameter() {
        // ---
        let registry = Registry::builtin();
        let pump = registry.profile(AssetType::Pump);
        let mut store = MemoryAlertStore::new();

        fire_all(&mut store, threshold_firings(pump, &flow(90.0)));
        let hot = SensorValues {
            temperature: Some(90.0),
            flow: Some(90.0),
            ..Default::default()
        };
        let outcomes = fire_all(&mut store, threshold_firings(pump, &hot));

        assert!(matches!(outcomes[0], AlertOutcome::Opened(_)));
        assert_eq!(outcomes[1], AlertOutcome::Suppressed);
        assert_eq!(store.open().count(), 2);
    }

    #[test]
    fn test_warning_escalates_to_critical_in_place() {
        // ---
        let registry = Registry::builtin();
        let pump = registry.profile(AssetType::Pump);
        let mut store = MemoryAlertStore::new();

        fire_all(&mut store, threshold_firings(pump, &flow(95.0)));
        let outcomes = fire_all(&mut store, threshold_firings(pump, &flow(60.0)));

        let AlertOutcome::Escalated(alert) = &outcomes[0] else {
            panic!("expected escalation, got {:?}", outcomes[0]);
        };
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(store.all().len(), 1);
        assert_eq!(store.all()[0].severity, Severity::Critical);

        // Never downgraded
        let outcomes = fire_all(&mut store, threshold_firings(pump, &flow(95.0)));
        assert_eq!(outcomes, vec![AlertOutcome::Suppressed]);
        assert_eq!(store.all()[0].severity, Severity::Critical);
    }

    #[test]
    fn test_resolved_alert_is_not_reopened() {
        // ---
        let mut store = MemoryAlertStore::new();
        let outcomes = fire_all(&mut store, rul_firing(Some(5.0)).into_iter().collect());
        let AlertOutcome::Opened(first) = &outcomes[0] else {
            panic!("expected a new alert");
        };

        assert!(store.resolve(first.id, Utc::now()).is_some());
        assert!(store.resolve(first.id, Utc::now()).is_none());

        let outcomes = fire_all(&mut store, rul_firing(Some(5.0)).into_iter().collect());
        let AlertOutcome::Opened(second) = &outcomes[0] else {
            panic!("expected a fresh alert after resolution");
        };
        assert_ne!(first.id, second.id);
        assert_eq!(store.all().len(), 2);
        assert_eq!(store.open().count(), 1);
    }

    #[test]
    fn test_health_rule() {
        // ---
        let registry = Registry::builtin();
        let pump = registry.profile(AssetType::Pump);

        assert_eq!(health_firing(pump, 75.0), None);
        assert_eq!(health_firing(pump, 60.0).unwrap().severity, Severity::Warning);
        let critical = health_firing(pump, 35.5).unwrap();
        assert_eq!(critical.severity, Severity::Critical);
        assert_eq!(critical.message, "Health index critically low: 35.5");
    }

    #[test]
    fn test_anomaly_rule() {
        // ---
        assert_eq!(anomaly_firing(70.0), None);
        assert_eq!(anomaly_firing(70.5).unwrap().severity, Severity::Warning);
        assert_eq!(anomaly_firing(85.0).unwrap().severity, Severity::Critical);
    }

    #[test]
    fn test_rul_rule() {
        // ---
        assert_eq!(rul_firing(None), None);
        assert_eq!(rul_firing(Some(31.0)), None);
        assert_eq!(rul_firing(Some(30.0)).unwrap().severity, Severity::Warning);
        let critical = rul_firing(Some(2.0)).unwrap();
        assert_eq!(critical.severity, Severity::Critical);
        assert_eq!(critical.message, "Critical: Estimated RUL only 2.0 days remaining");
    }

    #[test]
    fn test_families_dedup_independently() {
        // ---
        let registry = Registry::builtin();
        let pump = registry.profile(AssetType::Pump);
        let mut store = MemoryAlertStore::new();

        for _ in 0..3 {
            let mut firings = threshold_firings(pump, &flow(70.0));
            firings.extend(health_firing(pump, 30.0));
            firings.extend(anomaly_firing(99.0));
            firings.extend(rul_firing(Some(3.0)));
            fire_all(&mut store, firings);
        }

        assert_eq!(store.open().count(), 4);
    }
}
