//! Application settings loaded from `config.toml`.
//!
//! Every field has a default, so a missing file or an empty file yields a working
//! configuration. `DATABASE_URL` from the environment (or `.env`) wins over the file.

use super::database::{DEFAULT_DATABASE_URL, database_url_from_env};
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::{path::Path, time::Duration};
use tracing::{debug, info};

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Record store connection string
    pub database_url: String,
    /// Due-reminder scheduler settings
    pub reminders: ReminderConfig,
    /// Notification outbox settings
    pub notifications: NotificationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            reminders: ReminderConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

/// Settings for the due-reminder sweep
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Seconds between scheduler ticks
    pub tick_interval_secs: u64,
    /// Days after the end of a month before reminders for it start
    pub grace_days: i64,
    /// Minimum days between two reminder runs for the same month
    pub repeat_every_days: i64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 3600,
            grace_days: 2,
            repeat_every_days: 2,
        }
    }
}

impl ReminderConfig {
    /// Scheduler tick period.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

/// Settings for post-commit notification delivery
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Events buffered before new ones are dropped
    pub queue_capacity: usize,
    /// Upper bound on a single sink delivery
    pub send_timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            send_timeout_ms: 2000,
        }
    }
}

impl NotificationConfig {
    /// Per-delivery timeout.
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Parses configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<()> {
    if config.reminders.tick_interval_secs == 0 {
        return Err(Error::Config {
            message: "reminders.tick_interval_secs must be positive".to_string(),
        });
    }
    if config.reminders.grace_days < 0 || config.reminders.repeat_every_days <= 0 {
        return Err(Error::Config {
            message: "reminder day counts must be positive".to_string(),
        });
    }
    if config.notifications.queue_capacity == 0 {
        return Err(Error::Config {
            message: "notifications.queue_capacity must be positive".to_string(),
        });
    }
    Ok(())
}

/// Loads configuration from a TOML file, falling back to defaults if the file is absent.
///
/// # Errors
/// Returns an error if:
/// - The file exists but cannot be read
/// - The TOML syntax is invalid
/// - A value is out of range
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    let mut config = if path_ref.exists() {
        debug!("Loading configuration from {:?}", path_ref);
        let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
            message: format!("Failed to read config file {path_ref:?}: {e}"),
        })?;
        parse_config(&contents)?
    } else {
        info!("No config file at {:?}, using defaults", path_ref);
        AppConfig::default()
    };

    if let Some(url) = database_url_from_env() {
        config.database_url = url;
    }

    Ok(config)
}

/// Loads configuration from the default location (./config.toml)
pub fn load_default_config() -> Result<AppConfig> {
    load_config("config.toml")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
            database_url = "sqlite::memory:"

            [reminders]
            grace_days = 3
        "#;

        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.reminders.grace_days, 3);
        assert_eq!(config.reminders.repeat_every_days, 2);
        assert_eq!(config.notifications.queue_capacity, 256);
        assert_eq!(config.notifications.send_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.reminders.tick_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_rejects_zero_queue() {
        let result = parse_config("[notifications]\nqueue_capacity = 0\n");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let result = parse_config("reminders = [");
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
