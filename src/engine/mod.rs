//! Asset health scoring engine (gateway module).
//!
//! One call to [`HealthEngine::assess`] runs a reading through every stage
//! in order:
//! - digital twin deviation (`twin`)
//! - anomaly detection against recent history (`anomaly`, `isolation`)
//! - remaining-useful-life estimation (`rul`)
//! - health index fusion (`fusion`)
//! - alert rules with open-alert dedup (`alerts`)
//!
//! All stages except the alert rules are pure functions of their inputs.
//! The alert rules read and write the [`AlertStore`] handed in by the
//! caller, who must hold that asset's lock for the whole pass.

use serde::Serialize;
use uuid::Uuid;

mod alerts;
mod anomaly;
mod fusion;
mod isolation;
mod profile;
mod rul;
mod stats;
mod twin;

pub use alerts::{AlertOutcome, AlertStore, MemoryAlertStore};
pub use anomaly::{AnomalyResult, DetectorKind};
pub use profile::{AssetProfile, Registry};
pub use rul::RulEstimate;
pub use stats::round_to;
pub use twin::{what_if, Scenario};

use crate::models::{Alert, AssetType, HealthPoint, HealthScore, Reading, SensorValues, TwinState};
use anomaly::{detector_for, AnomalyDetector};

// ---

/// Everything one scoring pass needs, borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    // ---
    pub asset_type: AssetType,
    pub current: &'a Reading,
    /// Prior readings of the same asset, oldest first, excluding `current`.
    pub recent: &'a [Reading],
    /// Prior health scores of the same asset, oldest first.
    pub health_history: &'a [HealthPoint],
    pub load_factor: f64,
}

/// Result of one scoring pass.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    // ---
    pub twin_state: TwinState,
    pub anomaly_result: AnomalyResult,
    pub rul_estimate: RulEstimate,
    pub health_score: HealthScore,
    pub new_alerts: Vec<Alert>,
    pub escalated_alerts: Vec<Alert>,
}

impl Assessment {
    /// Drop new alerts that were not stored.
    pub fn discard_new_alerts(&mut self, ids: &[Uuid]) {
        self.new_alerts.retain(|alert| !ids.contains(&alert.id));
    }
}

pub struct HealthEngine {
    registry: Registry,
    detector: Box<dyn AnomalyDetector>,
    detector_kind: DetectorKind,
}

impl HealthEngine {
    // ---
    pub fn new(registry: Registry, detector_kind: DetectorKind) -> Self {
        HealthEngine {
            registry,
            detector: detector_for(detector_kind),
            detector_kind,
        }
    }

    pub fn detector_kind(&self) -> DetectorKind {
        self.detector_kind
    }

    pub fn profile(&self, asset_type: AssetType) -> &AssetProfile {
        self.registry.profile(asset_type)
    }

    /// Score one reading and evaluate its alerts against `store`.
    ///
    /// Always completes: stages lacking data contribute neutral values.
    pub fn assess<S: AlertStore + ?Sized>(&self, input: ScoringInput<'_>, store: &mut S) -> Assessment {
        // ---
        let profile = self.registry.profile(input.asset_type);
        let current = input.current;

        let twin_state = twin::twin_state(profile, current, input.load_factor);

        let history: Vec<SensorValues> = input.recent.iter().map(|r| r.values).collect();
        let anomaly_result = self.detector.detect(&history, &current.values);

        // Channel trends include the reading being scored as their latest point
        let trend_window: Vec<Reading> = input
            .recent
            .iter()
            .chain(std::iter::once(current))
            .cloned()
            .collect();
        let rul_estimate = rul::estimate(
            profile,
            input.health_history,
            &rul::parameter_histories(&trend_window),
        );

        let health_index = fusion::fuse(
            twin_state.deviation_score,
            anomaly_result.anomaly_score,
            rul_estimate.rul_days,
            rul_estimate.risk_score,
        );
        let health_score = HealthScore {
            asset_id: current.asset_id,
            timestamp: current.timestamp,
            health_index,
            twin_deviation_score: twin_state.deviation_score,
            anomaly_score: anomaly_result.anomaly_score,
            rul_days: rul_estimate.rul_days,
            failure_risk_score: rul_estimate.risk_score,
        };

        let mut firings = alerts::threshold_firings(profile, &current.values);
        firings.extend(alerts::health_firing(profile, health_index));
        firings.extend(alerts::anomaly_firing(anomaly_result.anomaly_score));
        firings.extend(alerts::rul_firing(rul_estimate.rul_days));

        let mut new_alerts = Vec::new();
        let mut escalated_alerts = Vec::new();
        for firing in firings {
            match alerts::apply(store, current.asset_id, current.timestamp, firing) {
                AlertOutcome::Opened(alert) => new_alerts.push(alert),
                AlertOutcome::Escalated(alert) => escalated_alerts.push(alert),
                AlertOutcome::Suppressed => {}
            }
        }

        tracing::debug!(
            asset_id = current.asset_id,
            health_index,
            deviation = twin_state.deviation_score,
            anomaly = anomaly_result.anomaly_score,
            rul_days = ?rul_estimate.rul_days,
            new_alerts = new_alerts.len(),
            "reading assessed"
        );

        Assessment {
            twin_state,
            anomaly_result,
            rul_estimate,
            health_score,
            new_alerts,
            escalated_alerts,
        }
    }
}

impl Default for HealthEngine {
    fn default() -> Self {
        HealthEngine::new(Registry::builtin(), DetectorKind::Statistical)
    }
}
