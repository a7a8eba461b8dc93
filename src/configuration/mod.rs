use crate::database::Database;
use serde::Deserialize;
use std::fs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File read error")]
    FileError,

    #[error("Deserialization error:{0}")]
    DeserializationError(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub telegram: TelegramConfig,
    pub feed: FeedConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub admins: Vec<i64>,
    #[serde(default = "default_access_days")]
    pub access_days: i64,
    #[serde(default = "default_week_price")]
    pub week_price_uzs: u32,
    #[serde(default = "default_true")]
    pub notify_on_start: bool,
    #[serde(default)]
    pub notify_on_loads: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_feed_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_access_days() -> i64 {
    7
}

fn default_week_price() -> u32 {
    20_000
}

fn default_true() -> bool {
    true
}

fn default_feed_endpoint() -> String {
    "/loads/latest".to_string()
}

fn default_feed_timeout() -> u64 {
    10
}

fn default_database_path() -> String {
    "loadgate.db".to_string()
}

#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub database: Database,
}

impl Config {
    pub fn new(config_file: &str) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(config_file).map_err(|_| ConfigError::FileError)?;
        let config: Config = serde_json::from_str(&config_str)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let raw = r#"{
            "telegram": { "admins": [101, 202] },
            "feed": { "base_url": "https://feed.example.com" },
            "database": {}
        }"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.telegram.admins, vec![101, 202]);
        assert_eq!(config.telegram.access_days, 7);
        assert_eq!(config.telegram.week_price_uzs, 20_000);
        assert!(config.telegram.notify_on_start);
        assert!(!config.telegram.notify_on_loads);
        assert_eq!(config.feed.endpoint, "/loads/latest");
        assert_eq!(config.feed.timeout_secs, 10);
        assert_eq!(config.database.path, "loadgate.db");
        assert_eq!(config.log_level, "info");
    }
}
