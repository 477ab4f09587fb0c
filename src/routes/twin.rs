//! What-if simulation on the digital twin.
//!
//! `GET /api/twin/{asset_type}/what-if?scenario=load_increase&base_load=1.0`
//! returns the baseline expectation next to the scenario's expectation so
//! the effect of the scenario can be read off per parameter.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{ApiResult, AppState};
use crate::models::SensorValues;
use crate::{what_if, AssetType, EngineError, Scenario};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/twin/{asset_type}/what-if", get(simulate))
}

#[derive(Debug, Deserialize)]
struct WhatIfQuery {
    scenario: Option<String>,
    base_load: Option<f64>,
}

#[derive(Debug, Serialize)]
struct WhatIfResponse {
    asset_type: AssetType,
    scenario: Scenario,
    base_load: f64,
    baseline: SensorValues,
    simulated: SensorValues,
}

async fn simulate(
    State(state): State<AppState>,
    Path(asset_type): Path<String>,
    Query(params): Query<WhatIfQuery>,
) -> ApiResult<Json<WhatIfResponse>> {
    // ---
    let asset_type = asset_type.parse::<AssetType>()?;
    let scenario = params
        .scenario
        .as_deref()
        .map(str::parse::<Scenario>)
        .transpose()?
        .unwrap_or(Scenario::Baseline);

    let base_load = params.base_load.unwrap_or(1.0);
    if !base_load.is_finite() || base_load <= 0.0 {
        return Err(EngineError::InvalidReading(format!(
            "base_load must be positive, got {base_load}"
        ))
        .into());
    }

    let profile = state.engine.profile(asset_type);
    Ok(Json(WhatIfResponse {
        asset_type,
        scenario,
        base_load,
        baseline: what_if(profile, Scenario::Baseline, base_load),
        simulated: what_if(profile, scenario, base_load),
    }))
}
