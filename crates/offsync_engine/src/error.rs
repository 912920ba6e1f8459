//! Error types for the sync engine.
//!
//! These cover the engine's own plumbing (configuration, job storage,
//! local handler failures). Remote failures never surface here: they are
//! classified into a [`offsync_protocol::SyncOutcome`] instead.

use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur inside the engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A sync configuration violates its invariants.
    #[error("invalid config for {entity_type}: {message}")]
    InvalidConfig {
        /// Entity type of the offending config.
        entity_type: String,
        /// What is wrong.
        message: String,
    },

    /// The job store failed.
    #[error("job store error: {0}")]
    Store(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A handler failed while reading or preparing local data.
    #[error("local error: {0}")]
    Local(String),

    /// Protocol-level invariant violated.
    #[error("protocol error: {0}")]
    Protocol(#[from] offsync_protocol::ProtocolError),

    /// Another process owns the queue directory.
    #[error("queue locked: another process has exclusive access")]
    Locked,
}

impl SyncError {
    /// Creates a local handler error.
    pub fn local(message: impl Into<String>) -> Self {
        Self::Local(message.into())
    }

    /// Creates a job store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Returns true if retrying the same work later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Io(_) | SyncError::Store(_) | SyncError::Local(_) | SyncError::Locked => {
                true
            }
            SyncError::InvalidConfig { .. }
            | SyncError::Serialization(_)
            | SyncError::Protocol(_) => false,
        }
    }
}
