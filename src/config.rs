//! Configuration loader for the `codemetal-assetsense` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::env;

use anyhow::{anyhow, Result};

use crate::engine::DetectorKind;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// TCP port the HTTP server binds on all interfaces.
    pub bind_port: u16,

    /// Prior readings handed to each scoring pass.
    pub history_window: u32,

    /// Prior health scores handed to the RUL trend.
    pub health_history_limit: u32,

    /// Anomaly detector used on the scoring path.
    pub anomaly_method: DetectorKind,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `BIND_PORT` – HTTP port (default: 8000)
/// - `HISTORY_WINDOW` – recent readings per scoring pass (default: 50)
/// - `HEALTH_HISTORY_LIMIT` – health points for RUL (default: 100)
/// - `ANOMALY_METHOD` – `statistical` or `isolation_forest` (default: statistical)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let bind_port = u16::try_from(parse_env_u32!("BIND_PORT", 8000))
        .map_err(|e| anyhow!("Invalid BIND_PORT: {}", e))?;
    let history_window = parse_env_u32!("HISTORY_WINDOW", 50);
    let health_history_limit = parse_env_u32!("HEALTH_HISTORY_LIMIT", 100);

    let anomaly_method = match env::var("ANOMALY_METHOD") {
        Ok(raw) => raw
            .parse::<DetectorKind>()
            .map_err(|e| anyhow!("Invalid ANOMALY_METHOD: {}", e))?,
        Err(_) => DetectorKind::Statistical,
    };

    Ok(Config {
        db_url,
        db_pool_max,
        bind_port,
        history_window,
        health_history_limit,
        anomaly_method,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL         : {}", self.masked_db_url());
        tracing::info!("  DB_POOL_MAX          : {}", self.db_pool_max);
        tracing::info!("  BIND_PORT            : {}", self.bind_port);
        tracing::info!("  HISTORY_WINDOW       : {}", self.history_window);
        tracing::info!("  HEALTH_HISTORY_LIMIT : {}", self.health_history_limit);
        tracing::info!("  ANOMALY_METHOD       : {:?}", self.anomaly_method);
    }

    /// Database URL with the password replaced by `****`.
    pub fn masked_db_url(&self) -> String {
        // ---
        // Credentials live between "://" and the last '@'
        let start = self.db_url.find("://").map_or(0, |p| p + 3);
        if let Some(at_pos) = self.db_url.rfind('@').filter(|&p| p > start) {
            if let Some(colon_pos) = self.db_url[start..at_pos].rfind(':') {
                let colon_pos = start + colon_pos;
                return format!(
                    "{}:****{}",
                    &self.db_url[..colon_pos],
                    &self.db_url[at_pos..]
                );
            }
        }
        self.db_url.clone()
    }
}
