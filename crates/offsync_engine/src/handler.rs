//! Per-entity-type handler contract.

use crate::classifier::{classify_result, ConflictDetector};
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::transport::RemoteError;
use offsync_protocol::{Conflict, ConflictType, Operation, PermanentError, SyncContext, SyncOutcome};
use std::collections::BTreeMap;

/// Business-specific half of a sync attempt.
///
/// One implementation exists per entity type (sale, payment, transfer, ...).
/// The [`SyncWorker`](crate::SyncWorker) drives the attempt and calls into
/// the handler at each step; the handler owns every read and write of the
/// local entity store.
///
/// Callbacks return `SyncResult<()>` so failures can be reported, but a
/// failing callback never changes an attempt's outcome.
pub trait EntityHandler: Send + Sync {
    /// Local entity record.
    type Entity;
    /// Wire request built from the entity.
    type Request;
    /// Server response on success.
    type Response;

    /// Policy for this entity type.
    fn config(&self) -> &SyncConfig;

    /// Entity type name. Defaults to the config's.
    fn entity_type(&self) -> &str {
        &self.config().entity_type
    }

    /// Loads the entity from the local store. `Ok(None)` means it is gone.
    fn get_entity(&self, entity_id: &str) -> SyncResult<Option<Self::Entity>>;

    /// Last-moment veto. Returning `false` cancels the attempt before any
    /// request is built.
    fn on_before_sync(&self, _entity: &Self::Entity, _operation: &Operation) -> bool {
        true
    }

    /// Builds the wire request.
    fn prepare_request(
        &self,
        entity: &Self::Entity,
        context: &SyncContext,
    ) -> SyncResult<Self::Request>;

    /// Performs the remote call. Transport failures must be classified,
    /// usually through [`EntityHandler::classify`].
    fn execute_sync(
        &self,
        request: Self::Request,
        context: &SyncContext,
    ) -> SyncOutcome<Self::Response>;

    /// The server accepted the mutation.
    fn on_sync_success(
        &self,
        entity: &Self::Entity,
        response: &Self::Response,
        context: &SyncContext,
    ) -> SyncResult<()>;

    /// The job ended with a permanent error.
    fn on_sync_error(
        &self,
        entity: &Self::Entity,
        error: &PermanentError,
        context: &SyncContext,
    ) -> SyncResult<()>;

    /// The server reported a business conflict.
    fn on_conflict(
        &self,
        entity: &Self::Entity,
        conflict: &Conflict,
        context: &SyncContext,
    ) -> SyncResult<()>;

    /// Extra job input attached whenever this entity is enqueued.
    fn additional_worker_data(&self, _entity_id: &str) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Type-specific conflict detection; `None` uses the default heuristic.
    fn detect_conflict(&self, _body: &str) -> Option<ConflictType> {
        None
    }

    /// Classifies a transport result using this handler's config and
    /// conflict detection.
    fn classify(
        &self,
        result: Result<Self::Response, RemoteError>,
    ) -> SyncOutcome<Self::Response>
    where
        Self: Sized,
    {
        let detector = HandlerDetector(self);
        classify_result(result, self.config(), Some(&detector))
    }
}

struct HandlerDetector<'a, H>(&'a H);

impl<H: EntityHandler> ConflictDetector for HandlerDetector<'_, H> {
    fn detect(&self, body: &str) -> Option<ConflictType> {
        self.0.detect_conflict(body)
    }
}
