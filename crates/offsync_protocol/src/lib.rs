//! # OffSync Protocol
//!
//! Value types shared by the OffSync engine and its handlers.
//!
//! This crate provides:
//! - `Operation` and `OperationKind` describing a local mutation
//! - `SyncOutcome`, the closed result taxonomy of a sync attempt
//! - `Conflict` and `ConflictType` for business collisions
//! - `SyncStatus`, the lifecycle of a locally-owned entity
//! - `JobInput` and `SyncContext` for persisted job payloads
//!
//! This is a pure crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod error;
mod job;
mod operation;
mod outcome;
mod status;

pub use conflict::{Conflict, ConflictType};
pub use error::{ProtocolError, ProtocolResult};
pub use job::{JobInput, SyncContext, ENTITY_ID_KEY, OPERATION_TYPE_KEY};
pub use operation::{Operation, OperationKind};
pub use outcome::{error_codes, PermanentError, RetryableError, SyncOutcome};
pub use status::SyncStatus;
