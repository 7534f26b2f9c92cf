pub mod enqueue;
pub mod get;
pub mod stats;
pub mod work;

use anyhow::{Context, Result};
use docket_persist::SqliteDatabase;
use docket_queue::Queue;

use crate::config::DocketConfig;

/// Connect to the configured database
pub async fn connect(config: &DocketConfig) -> Result<SqliteDatabase> {
    SqliteDatabase::new(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))
}

/// Open one named queue on an existing connection
pub async fn open_queue(db: &SqliteDatabase, config: &DocketConfig, name: &str) -> Result<Queue> {
    Queue::open(db, name, config.queue_config())
        .await
        .with_context(|| format!("Failed to open queue '{}'", name))
}

/// Parse an optional JSON flag value
pub fn parse_json(flag: &str, raw: Option<&str>) -> Result<Option<serde_json::Value>> {
    raw.map(|s| {
        serde_json::from_str(s).with_context(|| format!("Invalid JSON for {}: {}", flag, s))
    })
    .transpose()
}
