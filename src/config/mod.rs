/// Record store connection and schema creation
pub mod database;

/// Application settings from config.toml
pub mod settings;

pub use settings::{AppConfig, NotificationConfig, ReminderConfig, load_config, load_default_config};
