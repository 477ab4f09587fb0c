//! Database schema management for `codemetal-assetsense`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `assets` registry, the append-only `sensor_readings`,
/// `digital_twin_states` and `health_scores` series, and the `alerts` table.
/// Safe to call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS assets (
            id          BIGSERIAL PRIMARY KEY,
            name        TEXT        NOT NULL UNIQUE,
            asset_type  TEXT        NOT NULL,
            location    TEXT,
            status      TEXT        NOT NULL DEFAULT 'operational',
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sensor_readings (
            id          BIGSERIAL PRIMARY KEY,
            asset_id    BIGINT      NOT NULL REFERENCES assets (id),
            timestamp   TIMESTAMPTZ NOT NULL,
            temperature DOUBLE PRECISION,
            pressure    DOUBLE PRECISION,
            vibration   DOUBLE PRECISION,
            flow        DOUBLE PRECISION,
            rpm         DOUBLE PRECISION
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS digital_twin_states (
            id                   BIGSERIAL PRIMARY KEY,
            asset_id             BIGINT      NOT NULL REFERENCES assets (id),
            timestamp            TIMESTAMPTZ NOT NULL,
            expected_temperature DOUBLE PRECISION,
            expected_pressure    DOUBLE PRECISION,
            expected_vibration   DOUBLE PRECISION,
            expected_flow        DOUBLE PRECISION,
            expected_rpm         DOUBLE PRECISION,
            deviation_score      DOUBLE PRECISION NOT NULL
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS health_scores (
            id                   BIGSERIAL PRIMARY KEY,
            asset_id             BIGINT      NOT NULL REFERENCES assets (id),
            timestamp            TIMESTAMPTZ NOT NULL,
            health_index         DOUBLE PRECISION NOT NULL,
            twin_deviation_score DOUBLE PRECISION NOT NULL,
            anomaly_score        DOUBLE PRECISION NOT NULL,
            rul_days             DOUBLE PRECISION,
            failure_risk_score   DOUBLE PRECISION NOT NULL
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id          UUID PRIMARY KEY,
            asset_id    BIGINT      NOT NULL REFERENCES assets (id),
            timestamp   TIMESTAMPTZ NOT NULL,
            alert_type  TEXT        NOT NULL,
            parameter   TEXT,
            severity    TEXT        NOT NULL,
            message     TEXT        NOT NULL,
            resolved    BOOLEAN     NOT NULL DEFAULT FALSE,
            resolved_at TIMESTAMPTZ
        );
        "#,
        // At most one unresolved alert per (asset, type, parameter)
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_alerts_open_key
            ON alerts (asset_id, alert_type, COALESCE(parameter, ''))
            WHERE NOT resolved;
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_readings_asset_ts
            ON sensor_readings (asset_id, timestamp);
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_digital_twin_states_asset_ts
            ON digital_twin_states (asset_id, timestamp);
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_health_scores_asset_ts
            ON health_scores (asset_id, timestamp);
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_asset_ts
            ON alerts (asset_id, timestamp);
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}
