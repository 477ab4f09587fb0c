//! Sensor reading ingestion and listing.
//!
//! `POST /api/sensors/readings` is the scoring path: validate, store, then
//! score the reading against its asset's history and persist the twin state,
//! health score and alerts, all in one transaction. The asset's lock is held from the history load
//! until the results are committed so concurrent readings of one asset see
//! each other's alerts.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{page_limit, ApiError, ApiResult, AppState};
use crate::models::StoredReading;
use crate::{store, Assessment, AssetType, MemoryAlertStore, RawSensorReading, ScoringInput};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/sensors/readings", get(list_readings).post(ingest_reading))
}

/// Query parameters for listing readings.
#[derive(Debug, Deserialize)]
struct ReadingsQuery {
    asset_id: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    reading: StoredReading,
    assessment: Assessment,
}

async fn ingest_reading(
    State(state): State<AppState>,
    Json(raw): Json<RawSensorReading>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    // ---
    debug!(asset_id = raw.asset_id, "POST /api/sensors/readings - Validating");
    raw.validate()?;

    let asset = store::get_asset(&state.pool, raw.asset_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Asset {}", raw.asset_id)))?;
    let asset_type = AssetType::parse_or_default(&asset.asset_type);

    let reading = raw.to_normalized();
    let load_factor = raw.load_factor.unwrap_or(1.0);

    let _guard = state.locks.lock(asset.id).await;

    // Reading, twin state, health score and alerts commit together or not at all
    let mut tx = state.pool.begin().await?;

    let stored = store::insert_reading(&mut *tx, &reading).await?;

    let config = &state.config;
    let recent = store::recent_readings(
        &mut *tx,
        asset.id,
        stored.id,
        i64::from(config.history_window),
    )
    .await?;
    let health_history =
        store::health_history(&mut *tx, asset.id, i64::from(config.health_history_limit)).await?;
    let mut alerts = MemoryAlertStore::from_alerts(store::open_alerts(&mut *tx, asset.id).await?);

    let input = ScoringInput {
        asset_type,
        current: &reading,
        recent: &recent,
        health_history: &health_history,
        load_factor,
    };
    let mut assessment = state.engine.assess(input, &mut alerts);

    store::save_assessment(&mut *tx, &mut assessment).await?;
    tx.commit().await?;

    info!(
        asset_id = asset.id,
        reading_id = stored.id,
        health_index = assessment.health_score.health_index,
        new_alerts = assessment.new_alerts.len(),
        escalated = assessment.escalated_alerts.len(),
        "POST /api/sensors/readings - Reading scored"
    );

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            reading: stored,
            assessment,
        }),
    ))
}

async fn list_readings(
    State(state): State<AppState>,
    Query(params): Query<ReadingsQuery>,
) -> ApiResult<Json<Vec<StoredReading>>> {
    // ---
    debug!("GET /api/sensors/readings - {:?}", params);
    let readings =
        store::list_readings(&state.pool, params.asset_id, page_limit(params.limit, 100)).await?;
    Ok(Json(readings))
}
