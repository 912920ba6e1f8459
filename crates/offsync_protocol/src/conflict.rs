//! Business conflicts reported by the server.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a business-rule collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    /// Not enough stock to apply the mutation.
    InsufficientStock,
    /// The entity already exists on the server.
    Duplicate,
    /// Someone else modified the entity first.
    ConcurrentModification,
    /// The server does not know the referenced entity.
    NotFound,
    /// Anything else.
    Other,
}

impl ConflictType {
    /// Returns the code used in error codes and logs.
    pub fn code(&self) -> &'static str {
        match self {
            ConflictType::InsufficientStock => "INSUFFICIENT_STOCK",
            ConflictType::Duplicate => "DUPLICATE",
            ConflictType::ConcurrentModification => "CONCURRENT_MODIFICATION",
            ConflictType::NotFound => "NOT_FOUND",
            ConflictType::Other => "OTHER",
        }
    }

    /// Returns true if the conflict means the server already holds the entity.
    ///
    /// A duplicate on create is the idempotent outcome of a retried request.
    pub fn is_idempotent_success(&self) -> bool {
        matches!(self, ConflictType::Duplicate)
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A conflict detected from the server's response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Human-readable message.
    pub message: String,
    /// Conflict category.
    pub conflict_type: ConflictType,
    /// Raw details (usually the response body).
    pub details: Option<String>,
}

impl Conflict {
    /// Creates a new conflict.
    pub fn new(message: impl Into<String>, conflict_type: ConflictType) -> Self {
        Self {
            message: message.into(),
            conflict_type,
            details: None,
        }
    }

    /// Attaches details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Returns the error code recorded when this conflict ends a job.
    pub fn error_code(&self) -> String {
        format!("CONFLICT_{}", self.conflict_type.code())
    }
}
