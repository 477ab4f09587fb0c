//! HTTP gateway: merges one sub-router per resource and binds shared state.
//!
//! Sub-routers only know about `AppState` and their parent module; `main.rs`
//! only knows about [`router`].

use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;

use crate::{AssetLocks, Config, HealthEngine};

mod alerts;
mod assets;
mod error;
mod health;
mod readings;
mod scores;
mod twin;

pub use error::{ApiError, ApiResult};

// ---

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    // ---
    pub pool: PgPool,
    pub config: Config,
    pub engine: Arc<HealthEngine>,
    /// Held across load-history, score and persist for one asset.
    pub locks: AssetLocks,
}

pub fn router(pool: PgPool, config: Config, engine: Arc<HealthEngine>) -> Router {
    // ---
    let state = AppState {
        pool,
        config,
        engine,
        locks: AssetLocks::new(),
    };

    Router::new()
        .merge(assets::router())
        .merge(readings::router())
        .merge(scores::router())
        .merge(alerts::router())
        .merge(twin::router())
        .merge(health::router())
        .with_state(state)
}

/// Clamp a caller-supplied page size to `1..=1000`.
fn page_limit(limit: Option<i64>, default: i64) -> i64 {
    // ---
    limit.unwrap_or(default).clamp(1, 1000)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_page_limit_defaults_and_clamps() {
        // ---
        assert_eq!(page_limit(None, 100), 100);
        assert_eq!(page_limit(Some(0), 100), 1);
        assert_eq!(page_limit(Some(5000), 100), 1000);
        assert_eq!(page_limit(Some(25), 100), 25);
    }
}
