//! Persisted job input and the per-attempt context built from it.

use crate::error::{ProtocolError, ProtocolResult};
use crate::operation::OperationKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Input key holding the entity ID.
pub const ENTITY_ID_KEY: &str = "entity_id";
/// Input key holding the operation kind.
pub const OPERATION_TYPE_KEY: &str = "operation_type";

/// Key/value payload persisted with a job.
///
/// Always carries `entity_id` and `operation_type`; any other keys are
/// caller hints forwarded into [`SyncContext::additional_data`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobInput {
    values: BTreeMap<String, String>,
}

impl JobInput {
    /// Builds input for an entity and operation, plus caller extras.
    ///
    /// Extras cannot override the reserved keys.
    pub fn new(
        entity_id: impl Into<String>,
        kind: OperationKind,
        extra: impl IntoIterator<Item = (String, String)>,
    ) -> ProtocolResult<Self> {
        let mut values = BTreeMap::new();
        for (key, value) in extra {
            if is_reserved(&key) {
                return Err(ProtocolError::ReservedKey(key));
            }
            values.insert(key, value);
        }
        values.insert(ENTITY_ID_KEY.to_string(), entity_id.into());
        values.insert(OPERATION_TYPE_KEY.to_string(), kind.as_str().to_string());
        Ok(Self { values })
    }

    /// Wraps raw key/values, e.g. read back from storage.
    pub fn from_map(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Returns a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the entity ID if present and not blank.
    pub fn entity_id(&self) -> Option<&str> {
        self.get(ENTITY_ID_KEY)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Returns the operation kind, defaulting to `Create`.
    pub fn operation_kind(&self) -> OperationKind {
        OperationKind::parse_or_default(self.get(OPERATION_TYPE_KEY))
    }

    /// Returns the caller extras (everything but the reserved keys).
    pub fn additional_data(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .filter(|(k, _)| !is_reserved(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Returns all raw key/values.
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

fn is_reserved(key: &str) -> bool {
    key == ENTITY_ID_KEY || key == OPERATION_TYPE_KEY
}

/// Ephemeral bag of data for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncContext {
    /// Entity being synced.
    pub entity_id: String,
    /// Operation kind.
    pub operation_kind: OperationKind,
    /// Hints attached by the enqueuer (e.g. warehouse IDs for a transfer).
    pub additional_data: BTreeMap<String, String>,
    /// Zero-based attempt counter for this job.
    pub attempt: u32,
}

impl SyncContext {
    /// Creates a context.
    pub fn new(entity_id: impl Into<String>, operation_kind: OperationKind, attempt: u32) -> Self {
        Self {
            entity_id: entity_id.into(),
            operation_kind,
            additional_data: BTreeMap::new(),
            attempt,
        }
    }

    /// Attaches extra data.
    pub fn with_additional_data(mut self, data: BTreeMap<String, String>) -> Self {
        self.additional_data = data;
        self
    }

    /// Returns an extra value by key.
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.additional_data.get(key).map(String::as_str)
    }
}
