//! Alert listing and resolution.
//!
//! Resolving is the only way an alert closes. Once resolved, the next firing
//! of the same rule opens a fresh alert.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use tracing::info;
use uuid::Uuid;

use super::{page_limit, ApiError, ApiResult, AppState};
use crate::models::{Alert, Severity};
use crate::store::{self, AlertFilter};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/{id}", get(get_alert))
        .route("/api/alerts/{id}/resolve", post(resolve_alert))
}

async fn list_alerts(
    State(state): State<AppState>,
    Query(mut filter): Query<AlertFilter>,
) -> ApiResult<Json<Vec<Alert>>> {
    // ---
    if let Some(severity) = filter.severity.take() {
        // Canonical spelling, and a 400 instead of an empty list on typos
        filter.severity = Some(severity.parse::<Severity>()?.as_str().to_string());
    }
    filter.limit = Some(page_limit(filter.limit, 100));

    let alerts = store::list_alerts(&state.pool, &filter).await?;
    Ok(Json(alerts))
}

async fn get_alert(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Alert>> {
    // ---
    let alert = store::get_alert(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Alert {id}")))?;
    Ok(Json(alert))
}

/// Idempotent: resolving twice keeps the first resolution time.
async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Alert>> {
    // ---
    let alert = store::resolve_alert(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Alert {id}")))?;

    info!(alert_id = %alert.id, asset_id = alert.asset_id, "POST /api/alerts/{{id}}/resolve - Alert resolved");
    Ok(Json(alert))
}
