//! Structured operational log sink.
//!
//! Every terminal and retry transition of a sync attempt produces a
//! [`LogEntry`]. Hosts forward these to their remote log collector; the
//! default [`TracingLogger`] turns them into `tracing` events.

use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Module name attached to every entry.
pub const SYNC_LOG_MODULE: &str = "OFFLINE_SYNC";

/// One structured log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Always [`SYNC_LOG_MODULE`].
    pub module: &'static str,
    /// What happened (`SYNC_SUCCESS`, `SYNC_RETRY`, ...).
    pub action: String,
    /// Human-readable message.
    pub message: String,
    /// Error text, for failures.
    pub error: Option<String>,
    /// Structured fields (entity type, entity id, attempt, ...).
    pub data: BTreeMap<String, String>,
}

impl LogEntry {
    /// Creates an entry.
    pub fn new(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            module: SYNC_LOG_MODULE,
            action: action.into(),
            message: message.into(),
            error: None,
            data: BTreeMap::new(),
        }
    }

    /// Attaches an error.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Adds a structured field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.data.insert(key.into(), value.to_string());
        self
    }

    /// Returns a field by key.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// Receiver of structured log records.
pub trait SyncLogger: Send + Sync {
    /// Records an entry. Must not fail or block for long.
    fn log(&self, entry: &LogEntry);
}

/// Emits entries as `tracing` events on the `offsync::remote` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl SyncLogger for TracingLogger {
    fn log(&self, entry: &LogEntry) {
        let data = format!("{:?}", entry.data);
        match &entry.error {
            Some(error) => tracing::warn!(
                target: "offsync::remote",
                module = entry.module,
                action = %entry.action,
                error = %error,
                data = %data,
                "{}",
                entry.message
            ),
            None => tracing::info!(
                target: "offsync::remote",
                module = entry.module,
                action = %entry.action,
                data = %data,
                "{}",
                entry.message
            ),
        }
    }
}

/// Keeps entries in memory, for tests and diagnostics screens.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    /// Creates an empty logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all entries recorded so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Returns the actions recorded so far, in order.
    pub fn actions(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.action.clone()).collect()
    }
}

impl SyncLogger for MemoryLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().push(entry.clone());
    }
}
