//! Cancel commands.
//!
//! Removing a job here only affects the queue directory. The entity's own
//! sync status in the app database is left as is.

use offsync_engine::{SyncQueue, SystemClock};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

fn open_queue(path: &Path) -> Result<SyncQueue, Box<dyn std::error::Error>> {
    let store = super::open_store(path)?;
    Ok(SyncQueue::new(Arc::new(store), Arc::new(SystemClock)))
}

/// Cancels one job by key.
pub fn run(path: &Path, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_queue(path)?;
    if !queue.cancel_key(key) {
        return Err(format!("No job with key {key}").into());
    }
    info!(key, "cancelled job");
    println!("✓ Cancelled {key}");
    Ok(())
}

/// Cancels every job of an entity type.
pub fn run_all(path: &Path, entity_type: &str) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_queue(path)?;
    let removed = queue.cancel_all(entity_type);
    info!(entity_type, removed, "cancelled jobs");
    println!("✓ Cancelled {removed} {entity_type} job(s)");
    Ok(())
}
