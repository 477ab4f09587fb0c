//! Asset registry endpoints.
//!
//! - `POST /api/assets` registers an asset; its type must be a known profile.
//! - `GET  /api/assets` lists assets.
//! - `GET  /api/assets/{id}` fetches one asset.
//! - `GET  /api/assets/{id}/metrics` bundles the latest reading, health
//!   score, twin state and the open alerts of an asset.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{page_limit, ApiError, ApiResult, AppState};
use crate::models::{Alert, Asset, HealthScore, StoredReading, TwinState};
use crate::{store, AssetType, NewAsset};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/assets", get(list_assets).post(create_asset))
        .route("/api/assets/{id}", get(get_asset))
        .route("/api/assets/{id}/metrics", get(asset_metrics))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<i64>,
}

/// Latest known state of one asset.
#[derive(Debug, Serialize)]
struct AssetMetrics {
    asset: Asset,
    latest_reading: Option<StoredReading>,
    latest_health: Option<HealthScore>,
    twin_state: Option<TwinState>,
    open_alerts: Vec<Alert>,
}

async fn create_asset(
    State(state): State<AppState>,
    Json(new_asset): Json<NewAsset>,
) -> ApiResult<(StatusCode, Json<Asset>)> {
    // ---
    let asset_type = new_asset.asset_type.parse::<AssetType>().map_err(|e| {
        warn!(asset_type = %new_asset.asset_type, "Rejected asset with unknown type");
        ApiError::from(e)
    })?;

    // Store the canonical spelling
    let new_asset = NewAsset {
        asset_type: asset_type.as_str().to_string(),
        ..new_asset
    };
    let asset = store::insert_asset(&state.pool, &new_asset).await?;

    info!(asset_id = asset.id, asset_type = %asset_type, "POST /api/assets - Registered asset");
    Ok((StatusCode::CREATED, Json(asset)))
}

async fn list_assets(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Asset>>> {
    // ---
    let assets = store::list_assets(&state.pool, page_limit(query.limit, 100)).await?;
    Ok(Json(assets))
}

async fn get_asset(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Asset>> {
    // ---
    let asset = store::get_asset(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Asset {id}")))?;
    Ok(Json(asset))
}

async fn asset_metrics(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AssetMetrics>> {
    // ---
    let pool = &state.pool;
    let asset = store::get_asset(pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Asset {id}")))?;

    let metrics = AssetMetrics {
        asset,
        latest_reading: store::latest_reading(pool, id).await?,
        latest_health: store::latest_health_score(pool, id).await?,
        twin_state: store::latest_twin_state(pool, id).await?,
        open_alerts: store::open_alerts(pool, id).await?,
    };
    Ok(Json(metrics))
}
