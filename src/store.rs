//! PostgreSQL persistence for readings, scores and alerts.
//!
//! Series tables are append-only and queried by asset and time. Alerts are
//! the only rows updated in place (escalation and resolution).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::engine::Assessment;
use crate::error::EngineError;
use crate::models::{
    Alert, Asset, HealthPoint, HealthScore, NewAsset, Parameter, Reading, SensorValues,
    StoredReading, TwinState,
};

// ---

const ALERT_COLUMNS: &str =
    "id, asset_id, timestamp, alert_type, parameter, severity, message, resolved, resolved_at";

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    // ---
    id: Uuid,
    asset_id: i64,
    timestamp: DateTime<Utc>,
    alert_type: String,
    parameter: Option<String>,
    severity: String,
    message: String,
    resolved: bool,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = EngineError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        // ---
        Ok(Alert {
            id: row.id,
            asset_id: row.asset_id,
            timestamp: row.timestamp,
            alert_type: row.alert_type.parse()?,
            parameter: row.parameter.as_deref().map(str::parse::<Parameter>).transpose()?,
            severity: row.severity.parse()?,
            message: row.message,
            resolved: row.resolved,
            resolved_at: row.resolved_at,
        })
    }
}

fn to_alerts(rows: Vec<AlertRow>) -> Result<Vec<Alert>> {
    // ---
    rows.into_iter()
        .map(|row| Alert::try_from(row).context("Corrupt alert row"))
        .collect()
}

#[derive(Debug, sqlx::FromRow)]
struct TwinStateRow {
    // ---
    asset_id: i64,
    timestamp: DateTime<Utc>,
    expected_temperature: Option<f64>,
    expected_pressure: Option<f64>,
    expected_vibration: Option<f64>,
    expected_flow: Option<f64>,
    expected_rpm: Option<f64>,
    deviation_score: f64,
}

impl From<TwinStateRow> for TwinState {
    fn from(row: TwinStateRow) -> Self {
        // ---
        TwinState {
            asset_id: row.asset_id,
            timestamp: row.timestamp,
            expected: SensorValues {
                temperature: row.expected_temperature,
                pressure: row.expected_pressure,
                vibration: row.expected_vibration,
                flow: row.expected_flow,
                rpm: row.expected_rpm,
            },
            deviation_score: row.deviation_score,
        }
    }
}

/// Optional filters for listing alerts.
#[derive(Debug, Default, serde::Deserialize)]
pub struct AlertFilter {
    // ---
    pub asset_id: Option<i64>,
    pub resolved: Option<bool>,
    pub severity: Option<String>,
    pub limit: Option<i64>,
}

// --- assets

pub async fn insert_asset(pool: &PgPool, asset: &NewAsset) -> Result<Asset> {
    // ---
    let row = sqlx::query_as::<_, Asset>(
        r#"
        INSERT INTO assets (name, asset_type, location)
        VALUES ($1, $2, $3)
        RETURNING id, name, asset_type, location, status, created_at
        "#,
    )
    .bind(&asset.name)
    .bind(&asset.asset_type)
    .bind(&asset.location)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_asset(pool: &PgPool, id: i64) -> Result<Option<Asset>> {
    // ---
    let row = sqlx::query_as::<_, Asset>(
        "SELECT id, name, asset_type, location, status, created_at FROM assets WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn list_assets(pool: &PgPool, limit: i64) -> Result<Vec<Asset>> {
    // ---
    let rows = sqlx::query_as::<_, Asset>(
        "SELECT id, name, asset_type, location, status, created_at FROM assets ORDER BY id LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// --- readings

pub async fn insert_reading(conn: impl PgExecutor<'_>, reading: &Reading) -> Result<StoredReading> {
    // ---
    let row = sqlx::query_as::<_, StoredReading>(
        r#"
        INSERT INTO sensor_readings (asset_id, timestamp, temperature, pressure, vibration, flow, rpm)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, asset_id, timestamp, temperature, pressure, vibration, flow, rpm
        "#,
    )
    .bind(reading.asset_id)
    .bind(reading.timestamp)
    .bind(reading.values.temperature)
    .bind(reading.values.pressure)
    .bind(reading.values.vibration)
    .bind(reading.values.flow)
    .bind(reading.values.rpm)
    .fetch_one(conn)
    .await?;

    Ok(row)
}

/// Latest `limit` readings of an asset other than `exclude_id`, oldest first.
pub async fn recent_readings(
    conn: impl PgExecutor<'_>,
    asset_id: i64,
    exclude_id: i64,
    limit: i64,
) -> Result<Vec<Reading>> {
    // ---
    let mut rows = sqlx::query_as::<_, StoredReading>(
        r#"
        SELECT id, asset_id, timestamp, temperature, pressure, vibration, flow, rpm
        FROM sensor_readings
        WHERE asset_id = $1 AND id <> $2
        ORDER BY timestamp DESC, id DESC
        LIMIT $3
        "#,
    )
    .bind(asset_id)
    .bind(exclude_id)
    .bind(limit)
    .fetch_all(conn)
    .await?;

    rows.reverse();
    Ok(rows.iter().map(StoredReading::to_reading).collect())
}

pub async fn list_readings(pool: &PgPool, asset_id: Option<i64>, limit: i64) -> Result<Vec<StoredReading>> {
    // ---
    let rows = sqlx::query_as::<_, StoredReading>(
        r#"
        SELECT id, asset_id, timestamp, temperature, pressure, vibration, flow, rpm
        FROM sensor_readings
        WHERE ($1::BIGINT IS NULL OR asset_id = $1)
        ORDER BY timestamp DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(asset_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn latest_reading(pool: &PgPool, asset_id: i64) -> Result<Option<StoredReading>> {
    // ---
    let mut rows = list_readings(pool, Some(asset_id), 1).await?;
    Ok(rows.pop())
}

// --- health scores and twin states

/// Most recent `limit` health points of an asset, oldest first.
pub async fn health_history(
    conn: impl PgExecutor<'_>,
    asset_id: i64,
    limit: i64,
) -> Result<Vec<HealthPoint>> {
    // ---
    let mut scores = list_health_scores(conn, Some(asset_id), limit).await?;
    scores.reverse();
    Ok(scores.iter().map(HealthScore::point).collect())
}

pub async fn list_health_scores(
    conn: impl PgExecutor<'_>,
    asset_id: Option<i64>,
    limit: i64,
) -> Result<Vec<HealthScore>> {
    // ---
    let rows = sqlx::query_as::<_, HealthScore>(
        r#"
        SELECT asset_id, timestamp, health_index, twin_deviation_score,
               anomaly_score, rul_days, failure_risk_score
        FROM health_scores
        WHERE ($1::BIGINT IS NULL OR asset_id = $1)
        ORDER BY timestamp DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(asset_id)
    .bind(limit)
    .fetch_all(conn)
    .await?;

    Ok(rows)
}

pub async fn latest_health_score(pool: &PgPool, asset_id: i64) -> Result<Option<HealthScore>> {
    // ---
    let mut rows = list_health_scores(pool, Some(asset_id), 1).await?;
    Ok(rows.pop())
}

pub async fn latest_twin_state(pool: &PgPool, asset_id: i64) -> Result<Option<TwinState>> {
    // ---
    let row = sqlx::query_as::<_, TwinStateRow>(
        r#"
        SELECT asset_id, timestamp, expected_temperature, expected_pressure,
               expected_vibration, expected_flow, expected_rpm, deviation_score
        FROM digital_twin_states
        WHERE asset_id = $1
        ORDER BY timestamp DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(asset_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(TwinState::from))
}

// --- alerts

pub async fn open_alerts(conn: impl PgExecutor<'_>, asset_id: i64) -> Result<Vec<Alert>> {
    // ---
    let rows = sqlx::query_as::<_, AlertRow>(&format!(
        "SELECT {ALERT_COLUMNS} FROM alerts WHERE asset_id = $1 AND NOT resolved ORDER BY timestamp DESC"
    ))
    .bind(asset_id)
    .fetch_all(conn)
    .await?;

    to_alerts(rows)
}

pub async fn list_alerts(pool: &PgPool, filter: &AlertFilter) -> Result<Vec<Alert>> {
    // ---
    let rows = sqlx::query_as::<_, AlertRow>(&format!(
        r#"
        SELECT {ALERT_COLUMNS} FROM alerts
        WHERE ($1::BIGINT IS NULL OR asset_id = $1)
          AND ($2::BOOLEAN IS NULL OR resolved = $2)
          AND ($3::TEXT IS NULL OR severity = $3)
        ORDER BY timestamp DESC
        LIMIT $4
        "#
    ))
    .bind(filter.asset_id)
    .bind(filter.resolved)
    .bind(&filter.severity)
    .bind(filter.limit.unwrap_or(100))
    .fetch_all(pool)
    .await?;

    to_alerts(rows)
}

pub async fn get_alert(pool: &PgPool, id: Uuid) -> Result<Option<Alert>> {
    // ---
    let row = sqlx::query_as::<_, AlertRow>(&format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| Alert::try_from(r).context("Corrupt alert row"))
        .transpose()
}

/// Resolve an alert. Resolving twice keeps the first `resolved_at`.
pub async fn resolve_alert(pool: &PgPool, id: Uuid) -> Result<Option<Alert>> {
    // ---
    let row = sqlx::query_as::<_, AlertRow>(&format!(
        r#"
        UPDATE alerts
        SET resolved = TRUE, resolved_at = COALESCE(resolved_at, now())
        WHERE id = $1
        RETURNING {ALERT_COLUMNS}
        "#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| Alert::try_from(r).context("Corrupt alert row"))
        .transpose()
}

/// Persist the artifacts of one scoring pass on `conn`.
///
/// The caller owns the transaction. A new alert rejected by the open-alert
/// index is removed from `assessment`, so the result only lists stored alerts.
pub async fn save_assessment(conn: &mut PgConnection, assessment: &mut Assessment) -> Result<()> {
    // ---
    let twin = &assessment.twin_state;
    sqlx::query(
        r#"
        INSERT INTO digital_twin_states (
            asset_id, timestamp, expected_temperature, expected_pressure,
            expected_vibration, expected_flow, expected_rpm, deviation_score
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(twin.asset_id)
    .bind(twin.timestamp)
    .bind(twin.expected.temperature)
    .bind(twin.expected.pressure)
    .bind(twin.expected.vibration)
    .bind(twin.expected.flow)
    .bind(twin.expected.rpm)
    .bind(twin.deviation_score)
    .execute(&mut *conn)
    .await?;

    let health = &assessment.health_score;
    sqlx::query(
        r#"
        INSERT INTO health_scores (
            asset_id, timestamp, health_index, twin_deviation_score,
            anomaly_score, rul_days, failure_risk_score
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(health.asset_id)
    .bind(health.timestamp)
    .bind(health.health_index)
    .bind(health.twin_deviation_score)
    .bind(health.anomaly_score)
    .bind(health.rul_days)
    .bind(health.failure_risk_score)
    .execute(&mut *conn)
    .await?;

    let mut rejected = Vec::new();
    for alert in &assessment.new_alerts {
        // The partial unique index rejects a second open alert for the same key
        let inserted = sqlx::query(
            r#"
            INSERT INTO alerts (id, asset_id, timestamp, alert_type, parameter, severity, message, resolved)
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(alert.id)
        .bind(alert.asset_id)
        .bind(alert.timestamp)
        .bind(alert.alert_type.as_str())
        .bind(alert.parameter.map(|p| p.as_str()))
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .execute(&mut *conn)
        .await?;

        if inserted.rows_affected() == 0 {
            tracing::warn!(alert_id = %alert.id, alert_type = %alert.alert_type, "duplicate open alert dropped");
            rejected.push(alert.id);
        }
    }
    assessment.discard_new_alerts(&rejected);

    for alert in &assessment.escalated_alerts {
        sqlx::query("UPDATE alerts SET severity = $2, message = $3 WHERE id = $1 AND NOT resolved")
            .bind(alert.id)
            .bind(alert.severity.as_str())
            .bind(&alert.message)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}
