//! Handler error type and its mapping onto HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::EngineError;

/// Failure of an API handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // ---
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Status, machine-readable code and client-facing message.
    fn classify(&self) -> (StatusCode, &'static str, String) {
        // ---
        match self {
            ApiError::Engine(EngineError::UnknownAssetType(_)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNKNOWN_ASSET_TYPE",
                self.to_string(),
            ),
            ApiError::Engine(err) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Database(err) => classify_sqlx_error(err),
            ApiError::Storage(err) => match err.downcast_ref::<sqlx::Error>() {
                Some(sqlx_err) => classify_sqlx_error(sqlx_err),
                None => internal_error(&format!("{err:#}")),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let (status, code, message) = self.classify();
        let body = json!({
            "error": message,
            "code": code,
        });
        (status, axum::Json(body)).into_response()
    }
}

/// Unique violations (PostgreSQL 23505) are conflicts; anything else is a 500
/// with the detail kept in the log.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    // ---
    if let sqlx::Error::Database(db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            let constraint = db_err.constraint().unwrap_or("unknown");
            return (
                StatusCode::CONFLICT,
                "CONFLICT",
                format!("Duplicate value violates unique constraint: {constraint}"),
            );
        }
    }
    internal_error(&err.to_string())
}

fn internal_error(detail: &str) -> (StatusCode, &'static str, String) {
    // ---
    tracing::error!(error = %detail, "Storage error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_status_mapping() {
        // ---
        let cases = [
            (ApiError::from(EngineError::UnknownAssetType("turbine".into())), StatusCode::UNPROCESSABLE_ENTITY),
            (ApiError::from(EngineError::InvalidReading("flow".into())), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("Asset 9".into()), StatusCode::NOT_FOUND),
            (ApiError::from(anyhow::anyhow!("pool timed out")), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::from(sqlx::Error::PoolTimedOut), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_unknown_asset_type_message_names_the_type() {
        // ---
        let err = ApiError::from(EngineError::UnknownAssetType("turbine".into()));
        let (_, code, message) = err.classify();
        assert_eq!(code, "UNKNOWN_ASSET_TYPE");
        assert!(message.contains("turbine"));
    }
}
