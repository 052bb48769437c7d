//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::{AppConfig, AppSettings, DatabaseConfig, GameConfig};
use crate::common::errors::{GameError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP_, nested with `__`)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    // APP__GAME__ROUND_DURATION_SECONDS=60 -> game.round_duration_seconds
    builder = builder.add_source(
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| GameError::Configuration(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| GameError::Configuration(e.to_string()))
}

/// Load configuration from plain environment variables only
pub fn load_from_env() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let database = std::env::var("DATABASE_URL").ok().map(|url| DatabaseConfig {
        url,
        max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
        connection_timeout_seconds: env_or("DATABASE_CONNECTION_TIMEOUT", 30),
    });

    let defaults = GameConfig::default();
    let game = GameConfig {
        round_duration_seconds: env_or("ROUND_DURATION_SECONDS", defaults.round_duration_seconds),
        registration_duration_seconds: env_or(
            "REGISTRATION_DURATION_SECONDS",
            defaults.registration_duration_seconds,
        ),
        stop_grace_ms: env_or("STOP_GRACE_MS", defaults.stop_grace_ms),
        shutdown_timeout_seconds: env_or("SHUTDOWN_TIMEOUT_SECONDS", defaults.shutdown_timeout_seconds),
        default_balance_amount: env_or("DEFAULT_BALANCE_AMOUNT", defaults.default_balance_amount),
    };

    let settings = AppSettings {
        log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
    };

    Ok(AppConfig {
        database,
        game,
        settings,
    })
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
