//! Record storage backends.

mod sqlite;

pub use sqlite::SqliteRecordStore;

use crate::config::StorageConfig;
use crate::error::GatewayError;
use sms_code::{MemoryRecordStore, RecordStore};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

/// Open the record store selected by `config`.
///
/// With persistence enabled the SQLite database (and its parent directory)
/// is created if missing; otherwise records live in memory.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn RecordStore>, GatewayError> {
    if !config.persist {
        warn!("Persistence disabled, using in-memory storage (data will be lost on restart)");
        return Ok(Arc::new(MemoryRecordStore::new()));
    }

    if let Some(parent) = config.database_url.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let store = SqliteRecordStore::open(&config.database_url).await?;
    info!(
        "Using SQLite storage at {}",
        config.database_url.display()
    );
    Ok(Arc::new(store))
}
