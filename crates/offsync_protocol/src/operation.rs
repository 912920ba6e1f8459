//! Sync operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of mutation being proposed to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    /// Entity was created locally.
    Create,
    /// Entity was updated locally.
    Update,
    /// Entity was deleted locally.
    Delete,
}

impl OperationKind {
    /// Returns the wire name used in job input.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "CREATE",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
        }
    }

    /// Parses a wire name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "CREATE" => Some(OperationKind::Create),
            "UPDATE" => Some(OperationKind::Update),
            "DELETE" => Some(OperationKind::Delete),
            _ => None,
        }
    }

    /// Parses a wire name, falling back to `Create` when absent or unrecognized.
    pub fn parse_or_default(name: Option<&str>) -> Self {
        name.and_then(Self::from_name)
            .unwrap_or(OperationKind::Create)
    }

    /// Informational priority (Create=1, Update=2, Delete=3).
    pub fn priority(&self) -> i32 {
        match self {
            OperationKind::Create => 1,
            OperationKind::Update => 2,
            OperationKind::Delete => 3,
        }
    }
}

impl Default for OperationKind {
    fn default() -> Self {
        OperationKind::Create
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation of one local entity that must reach the server.
///
/// `Operation` is an immutable value built at enqueue time, or rebuilt
/// from persisted job input before each attempt.
///
/// # Fields
///
/// - `entity_id`: Local identifier of the entity
/// - `entity_type`: Business type (sale, payment, transfer, ...)
/// - `kind`: Create, Update or Delete
/// - `priority`: Derived from `kind`, documentation only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    entity_id: String,
    entity_type: String,
    kind: OperationKind,
    priority: i32,
}

impl Operation {
    /// Creates a new operation.
    pub fn new(
        entity_id: impl Into<String>,
        entity_type: impl Into<String>,
        kind: OperationKind,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type: entity_type.into(),
            kind,
            priority: kind.priority(),
        }
    }

    /// Creates a Create operation.
    pub fn create(entity_id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self::new(entity_id, entity_type, OperationKind::Create)
    }

    /// Creates an Update operation.
    pub fn update(entity_id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self::new(entity_id, entity_type, OperationKind::Update)
    }

    /// Creates a Delete operation.
    pub fn delete(entity_id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self::new(entity_id, entity_type, OperationKind::Delete)
    }

    /// Returns the entity ID.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Returns the entity type.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns the operation kind.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Returns the informational priority.
    pub fn priority(&self) -> i32 {
        self.priority
    }
}
