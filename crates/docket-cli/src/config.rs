//! CLI configuration
//!
//! Values come from `DOCKET_*` environment variables; command-line flags are
//! applied on top by `main`.

use std::env;
use std::time::Duration;

use docket_queue::QueueConfig;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:docket.db?mode=rwc";

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocketConfig {
    /// env: DOCKET_DATABASE_URL
    pub database_url: String,
    /// env: DOCKET_COLLECTION
    pub collection: String,
    /// env: DOCKET_INTERVAL_MS
    pub interval: Duration,
    /// env: DOCKET_UNIVERSAL
    pub universal: bool,
}

impl Default for DocketConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            collection: docket_queue::queue::DEFAULT_COLLECTION.to_string(),
            interval: docket_queue::worker::DEFAULT_INTERVAL,
            universal: false,
        }
    }
}

impl DocketConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("DOCKET_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(collection) = lookup("DOCKET_COLLECTION") {
            config.collection = collection;
        }
        if let Some(value) = lookup("DOCKET_INTERVAL_MS") {
            let ms = value.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                var: "DOCKET_INTERVAL_MS",
                value: value.clone(),
                reason: e.to_string(),
            })?;
            config.interval = Duration::from_millis(ms);
        }
        if let Some(value) = lookup("DOCKET_UNIVERSAL") {
            config.universal = parse_bool(&value).ok_or_else(|| ConfigError::Invalid {
                var: "DOCKET_UNIVERSAL",
                value: value.clone(),
                reason: "expected true/false".to_string(),
            })?;
        }

        Ok(config)
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig::default()
            .with_collection(self.collection.clone())
            .universal(self.universal)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
