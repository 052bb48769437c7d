//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database configuration; the in-memory store is used when absent
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// Game engine tuning
    #[serde(default)]
    pub game: GameConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    30
}

/// Timing of the trade and registration periods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Trade period length until the settings say otherwise
    #[serde(default = "default_round_duration")]
    pub round_duration_seconds: u64,
    /// How long registration stays open before closing by itself
    #[serde(default = "default_registration_duration")]
    pub registration_duration_seconds: u64,
    /// Bounded wait of a period stop, in milliseconds
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,
    /// Time given to detached period tasks on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
    /// Starting balance seeded into fresh settings
    #[serde(default = "default_balance_amount")]
    pub default_balance_amount: i64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            round_duration_seconds: default_round_duration(),
            registration_duration_seconds: default_registration_duration(),
            stop_grace_ms: default_stop_grace(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            default_balance_amount: default_balance_amount(),
        }
    }
}

impl GameConfig {
    pub fn round_duration(&self) -> Duration {
        Duration::from_secs(self.round_duration_seconds)
    }

    pub fn registration_duration(&self) -> Duration {
        Duration::from_secs(self.registration_duration_seconds)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

fn default_round_duration() -> u64 {
    300
}

fn default_registration_duration() -> u64 {
    24 * 60 * 60
}

fn default_stop_grace() -> u64 {
    1000
}

fn default_shutdown_timeout() -> u64 {
    10
}

fn default_balance_amount() -> i64 {
    10_000
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_config_defaults() {
        let config = GameConfig::default();
        assert_eq!(config.round_duration(), Duration::from_secs(300));
        assert_eq!(config.registration_duration(), Duration::from_secs(86_400));
        assert_eq!(config.stop_grace(), Duration::from_secs(1));
        assert_eq!(config.default_balance_amount, 10_000);
    }

    #[test]
    fn test_partial_game_section_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"game": {"round_duration_seconds": 60}}"#).unwrap();
        assert_eq!(config.game.round_duration_seconds, 60);
        assert_eq!(config.game.shutdown_timeout_seconds, 10);
        assert!(config.database.is_none());
        assert_eq!(config.settings.log_level, "info");
    }
}
