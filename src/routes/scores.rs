//! Health score history endpoints.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::{page_limit, ApiError, ApiResult, AppState};
use crate::models::HealthScore;
use crate::store;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/health/scores", get(list_scores))
        .route("/api/health/scores/{asset_id}/latest", get(latest_score))
}

#[derive(Debug, Deserialize)]
struct ScoresQuery {
    asset_id: Option<i64>,
    limit: Option<i64>,
}

/// Newest first.
async fn list_scores(
    State(state): State<AppState>,
    Query(params): Query<ScoresQuery>,
) -> ApiResult<Json<Vec<HealthScore>>> {
    // ---
    let scores =
        store::list_health_scores(&state.pool, params.asset_id, page_limit(params.limit, 100))
            .await?;
    Ok(Json(scores))
}

async fn latest_score(
    State(state): State<AppState>,
    Path(asset_id): Path<i64>,
) -> ApiResult<Json<HealthScore>> {
    // ---
    let score = store::latest_health_score(&state.pool, asset_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Health score for asset {asset_id}")))?;
    Ok(Json(score))
}
