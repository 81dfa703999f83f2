//! Configuration module for feedwatch.

use serde::Deserialize;
use std::path::Path;

use crate::{FeedwatchError, Result};

/// Environment variable that overrides the configured Telegram bot token.
pub const TELEGRAM_TOKEN_ENV: &str = "FEEDWATCH_TELEGRAM_TOKEN";

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/feedwatch.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file path. When unset, logs go to the console only.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Poller configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Seconds between due-feed checks.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Milliseconds to sleep between notification sends.
    #[serde(default = "default_send_pacing_ms")]
    pub send_pacing_ms: u64,
}

fn default_tick_secs() -> u64 {
    60
}

fn default_send_pacing_ms() -> u64 {
    50
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            send_pacing_ms: default_send_pacing_ms(),
        }
    }
}

/// Telegram delivery configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token. Overridden by the FEEDWATCH_TELEGRAM_TOKEN
    /// environment variable when set.
    #[serde(default)]
    pub bot_token: String,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Poller settings.
    #[serde(default)]
    pub poller: PollerConfig,
    /// Telegram settings.
    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields fall back to their defaults. The Telegram token may be
    /// supplied or overridden via the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| FeedwatchError::Config(format!("invalid config file: {e}")))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(TELEGRAM_TOKEN_ENV) {
            if !token.is_empty() {
                self.telegram.bot_token = token;
            }
        }
    }
}
