// src/routes/health.rs
//! Liveness endpoint for the asset health service.
//!
//! Used by container orchestrators and CI pipelines to verify that the
//! service is up. It reports the configured anomaly detector so a deployment
//! can be checked without reading its environment. Follows EMBP: the handler
//! stays private and only the sub-router is exported to the gateway.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;
use crate::DetectorKind;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    anomaly_method: DetectorKind,
}

/// Handle `GET /health`.
///
/// Does not touch the database.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    // ---
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        anomaly_method: state.engine.detector_kind(),
    })
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/health", get(health))
}
