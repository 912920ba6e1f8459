//! Outcome of a single sync attempt.

use crate::conflict::{Conflict, ConflictType};
use serde::{Deserialize, Serialize};

/// Well-known permanent error codes.
pub mod error_codes {
    /// The retry budget was exhausted.
    pub const MAX_RETRIES_EXCEEDED: &str = "MAX_RETRIES_EXCEEDED";
    /// Job input carried no entity ID.
    pub const MISSING_ENTITY_ID: &str = "MISSING_ENTITY_ID";
    /// The entity no longer exists locally.
    pub const ENTITY_NOT_FOUND: &str = "ENTITY_NOT_FOUND";
    /// No handler is registered for the job's entity type.
    pub const NO_HANDLER: &str = "NO_HANDLER";
    /// The handler panicked while an attempt was running.
    pub const HANDLER_PANICKED: &str = "HANDLER_PANICKED";

    /// Error code for a non-retryable HTTP status.
    pub fn http(status: u16) -> String {
        format!("HTTP_{status}")
    }
}

/// A transient failure, eligible for a backoff retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryableError {
    /// Human-readable message.
    pub message: String,
    /// Underlying cause, if any.
    pub cause: Option<String>,
    /// HTTP status, if the failure came from a response.
    pub http_code: Option<u16>,
}

impl RetryableError {
    /// Creates a retryable error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            http_code: None,
        }
    }

    /// Attaches a cause.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Attaches an HTTP status.
    pub fn with_http_code(mut self, code: u16) -> Self {
        self.http_code = Some(code);
        self
    }
}

/// A failure that must not be retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermanentError {
    /// Human-readable message.
    pub message: String,
    /// Machine-readable code (`HTTP_422`, `MAX_RETRIES_EXCEEDED`, ...).
    pub error_code: String,
    /// Underlying cause, if any.
    pub cause: Option<String>,
    /// HTTP status, if the failure came from a response.
    pub http_code: Option<u16>,
    /// Extra details (usually the response body).
    pub details: Option<String>,
}

impl PermanentError {
    /// Creates a permanent error.
    pub fn new(message: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_code: error_code.into(),
            cause: None,
            http_code: None,
            details: None,
        }
    }

    /// Attaches a cause.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Attaches an HTTP status.
    pub fn with_http_code(mut self, code: u16) -> Self {
        self.http_code = Some(code);
        self
    }

    /// Attaches details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Converts an exhausted retryable error into its terminal form.
    ///
    /// The original message, cause and status are kept so the entity's
    /// error state still says what kept failing.
    pub fn max_retries_exceeded(last: RetryableError, attempts: u32) -> Self {
        Self {
            message: format!("gave up after {attempts} attempts: {}", last.message),
            error_code: error_codes::MAX_RETRIES_EXCEEDED.to_string(),
            cause: last.cause,
            http_code: last.http_code,
            details: None,
        }
    }
}

/// The closed set of outcomes a sync attempt can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome<R> {
    /// The server accepted the mutation.
    Success(R),
    /// Transient failure.
    Retryable(RetryableError),
    /// Failure that no retry can fix.
    Permanent(PermanentError),
    /// Business-rule collision.
    Conflict(Conflict),
    /// Abandoned before completion.
    Cancelled,
}

impl<R> SyncOutcome<R> {
    /// Shorthand for a retryable outcome.
    pub fn retryable(message: impl Into<String>) -> Self {
        SyncOutcome::Retryable(RetryableError::new(message))
    }

    /// Shorthand for a permanent outcome.
    pub fn permanent(message: impl Into<String>, error_code: impl Into<String>) -> Self {
        SyncOutcome::Permanent(PermanentError::new(message, error_code))
    }

    /// Shorthand for a conflict outcome.
    pub fn conflict(message: impl Into<String>, conflict_type: ConflictType) -> Self {
        SyncOutcome::Conflict(Conflict::new(message, conflict_type))
    }

    /// Returns true for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success(_))
    }

    /// Returns true for `Retryable`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncOutcome::Retryable(_))
    }

    /// Returns the variant name, for logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SyncOutcome::Success(_) => "success",
            SyncOutcome::Retryable(_) => "retryable",
            SyncOutcome::Permanent(_) => "permanent",
            SyncOutcome::Conflict(_) => "conflict",
            SyncOutcome::Cancelled => "cancelled",
        }
    }

    /// Maps the success payload.
    pub fn map<U, F: FnOnce(R) -> U>(self, f: F) -> SyncOutcome<U> {
        match self {
            SyncOutcome::Success(data) => SyncOutcome::Success(f(data)),
            SyncOutcome::Retryable(e) => SyncOutcome::Retryable(e),
            SyncOutcome::Permanent(e) => SyncOutcome::Permanent(e),
            SyncOutcome::Conflict(c) => SyncOutcome::Conflict(c),
            SyncOutcome::Cancelled => SyncOutcome::Cancelled,
        }
    }
}
