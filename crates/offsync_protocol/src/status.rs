//! Sync status of a locally-owned entity.
//!
//! ```text
//! PendingCreate ─┐
//! PendingUpdate ─┼─► Syncing ─► Synced
//! PendingDelete ─┘      ▲   └─► Error ─┐
//!                       └──────────────┘
//! ```
//!
//! The status lives on the entity record. Only handler callbacks change it.

use crate::error::{ProtocolError, ProtocolResult};
use crate::operation::OperationKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a local entity with respect to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Created locally, never sent.
    PendingCreate,
    /// Updated locally since the last sync.
    PendingUpdate,
    /// Deleted locally, deletion not yet sent.
    PendingDelete,
    /// An attempt is in progress.
    Syncing,
    /// Server state matches local state.
    Synced,
    /// Last attempt failed; awaiting manual or scheduled retry.
    Error,
}

impl SyncStatus {
    /// Returns the pending status for an operation kind.
    pub fn pending_for(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Create => SyncStatus::PendingCreate,
            OperationKind::Update => SyncStatus::PendingUpdate,
            OperationKind::Delete => SyncStatus::PendingDelete,
        }
    }

    /// Returns true if the entity still has to reach the server.
    pub fn needs_sync(&self) -> bool {
        matches!(
            self,
            SyncStatus::PendingCreate
                | SyncStatus::PendingUpdate
                | SyncStatus::PendingDelete
                | SyncStatus::Error
        )
    }

    /// Returns true for the `Pending*` states.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            SyncStatus::PendingCreate | SyncStatus::PendingUpdate | SyncStatus::PendingDelete
        )
    }

    /// Returns true if the lifecycle allows moving to `to`.
    pub fn can_transition_to(&self, to: SyncStatus) -> bool {
        match (self, to) {
            (from, SyncStatus::Syncing) => from.needs_sync(),
            (SyncStatus::Syncing, SyncStatus::Synced | SyncStatus::Error) => true,
            // A local edit re-opens a synced or failed entity.
            (SyncStatus::Synced | SyncStatus::Error, to) => to.is_pending(),
            _ => false,
        }
    }

    /// Validates and returns the new status.
    pub fn transition(self, to: SyncStatus) -> ProtocolResult<SyncStatus> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(ProtocolError::InvalidTransition { from: self, to })
        }
    }

    /// Returns the stored name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::PendingCreate => "PENDING_CREATE",
            SyncStatus::PendingUpdate => "PENDING_UPDATE",
            SyncStatus::PendingDelete => "PENDING_DELETE",
            SyncStatus::Syncing => "SYNCING",
            SyncStatus::Synced => "SYNCED",
            SyncStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_sync_states() {
        assert!(SyncStatus::PendingCreate.needs_sync());
        assert!(SyncStatus::PendingUpdate.needs_sync());
        assert!(SyncStatus::PendingDelete.needs_sync());
        assert!(SyncStatus::Error.needs_sync());
        assert!(!SyncStatus::Syncing.needs_sync());
        assert!(!SyncStatus::Synced.needs_sync());
    }

    #[test]
    fn happy_path() {
        let status = SyncStatus::pending_for(OperationKind::Create);
        let status = status.transition(SyncStatus::Syncing).unwrap();
        let status = status.transition(SyncStatus::Synced).unwrap();
        assert_eq!(status, SyncStatus::Synced);
    }

    #[test]
    fn error_can_be_retried() {
        let status = SyncStatus::Syncing.transition(SyncStatus::Error).unwrap();
        assert_eq!(
            status.transition(SyncStatus::Syncing).unwrap(),
            SyncStatus::Syncing
        );
    }

    #[test]
    fn synced_cannot_start_syncing() {
        let err = SyncStatus::Synced
            .transition(SyncStatus::Syncing)
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidTransition {
                from: SyncStatus::Synced,
                to: SyncStatus::Syncing,
            }
        );
        assert!(!SyncStatus::PendingCreate.can_transition_to(SyncStatus::Synced));
    }

    #[test]
    fn local_edit_reopens_synced_entity() {
        assert!(SyncStatus::Synced.can_transition_to(SyncStatus::PendingUpdate));
        assert!(SyncStatus::Error.can_transition_to(SyncStatus::PendingDelete));
        assert!(!SyncStatus::Syncing.can_transition_to(SyncStatus::PendingUpdate));
    }
}
