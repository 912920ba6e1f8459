//! Sync orchestrator: drives one attempt of one job.
//!
//! ```text
//! Started → Validating → Fetching → Preconditions → Executing → Resolving
//!                │            │            │                        │
//!                ▼            ▼            ▼                        ▼
//!        FailedPermanently  FailedPermanently  Cancelled   Succeeded | RetryScheduled
//!                                                          | FailedPermanently | Cancelled
//! ```
//!
//! The worker never sleeps and never retries by itself. It reports
//! `RetryScheduled` and the queue reschedules the job with backoff.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::handler::EntityHandler;
use crate::logger::{LogEntry, SyncLogger, TracingLogger};
use offsync_protocol::{
    error_codes, JobInput, Operation, PermanentError, RetryableError, SyncContext, SyncOutcome,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Step of the attempt state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    /// Attempt created.
    Started,
    /// Checking job input.
    Validating,
    /// Loading the local entity.
    Fetching,
    /// Asking the handler whether to proceed.
    Preconditions,
    /// Building the request and calling the server.
    Executing,
    /// Applying the outcome.
    Resolving,
}

/// Terminal result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The mutation reached the server (or already was there).
    Succeeded,
    /// Transient failure under budget; the job should run again later.
    RetryScheduled {
        /// Why the attempt failed.
        message: String,
    },
    /// Nothing further will be attempted.
    FailedPermanently {
        /// Machine-readable code.
        error_code: String,
        /// Human-readable message.
        message: String,
    },
    /// The attempt was abandoned before completion.
    Cancelled,
}

impl AttemptOutcome {
    /// Returns true unless the job must run again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptOutcome::RetryScheduled { .. })
    }

    fn failed(error: &PermanentError) -> Self {
        AttemptOutcome::FailedPermanently {
            error_code: error.error_code.clone(),
            message: error.message.clone(),
        }
    }
}

/// What one attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReport {
    /// Terminal outcome.
    pub outcome: AttemptOutcome,
    /// Phase in which the attempt ended.
    pub phase: AttemptPhase,
    /// Zero-based attempt counter.
    pub attempt: u32,
}

/// Object-safe view of a worker, used by the runner's registry.
pub trait JobExecutor: Send + Sync {
    /// Entity type served.
    fn entity_type(&self) -> &str;

    /// Policy of the entity type.
    fn config(&self) -> &SyncConfig;

    /// Extra job input for an entity, added on enqueue.
    fn additional_data(&self, entity_id: &str) -> BTreeMap<String, String>;

    /// Runs one attempt.
    fn execute(&self, input: &JobInput, attempt: u32) -> AttemptReport;
}

/// Entity-agnostic orchestrator, generic over the handler.
pub struct SyncWorker<H: EntityHandler> {
    handler: Arc<H>,
    logger: Arc<dyn SyncLogger>,
}

impl<H: EntityHandler> SyncWorker<H> {
    /// Creates a worker that logs through `tracing`.
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            logger: Arc::new(TracingLogger),
        }
    }

    /// Sets the structured log sink.
    pub fn with_logger(mut self, logger: Arc<dyn SyncLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Returns the handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Runs one attempt of the job described by `input`.
    pub fn run(&self, input: &JobInput, attempt: u32) -> AttemptReport {
        let report = |outcome, phase| AttemptReport {
            outcome,
            phase,
            attempt,
        };

        let Some(entity_id) = input.entity_id() else {
            let error =
                PermanentError::new("job input has no entity id", error_codes::MISSING_ENTITY_ID);
            self.emit(
                &SyncContext::new("", input.operation_kind(), attempt),
                LogEntry::new("INVALID_INPUT", "sync job started without an entity id")
                    .with_error(&error.message),
            );
            return report(AttemptOutcome::failed(&error), AttemptPhase::Validating);
        };

        let kind = input.operation_kind();
        let operation = Operation::new(entity_id, self.handler.entity_type(), kind);
        let context = SyncContext::new(entity_id, kind, attempt)
            .with_additional_data(input.additional_data());

        self.trace_phase(AttemptPhase::Fetching, &context);
        let entity = match self.handler.get_entity(entity_id) {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                let error = PermanentError::new(
                    format!("entity {entity_id} no longer exists locally"),
                    error_codes::ENTITY_NOT_FOUND,
                );
                self.emit(
                    &context,
                    LogEntry::new("ENTITY_NOT_FOUND", "entity vanished before sync")
                        .with_error(&error.message),
                );
                return report(AttemptOutcome::failed(&error), AttemptPhase::Fetching);
            }
            Err(err) => {
                let outcome = self.local_failure_without_entity(&context, &err);
                return report(outcome, AttemptPhase::Fetching);
            }
        };

        self.trace_phase(AttemptPhase::Preconditions, &context);
        if !self.handler.on_before_sync(&entity, &operation) {
            self.emit(
                &context,
                LogEntry::new("SYNC_CANCELLED", "precondition vetoed the attempt"),
            );
            return report(AttemptOutcome::Cancelled, AttemptPhase::Preconditions);
        }

        self.trace_phase(AttemptPhase::Executing, &context);
        let outcome = match self.handler.prepare_request(&entity, &context) {
            Ok(request) => self.handler.execute_sync(request, &context),
            Err(err) => SyncOutcome::Retryable(
                RetryableError::new(format!("could not prepare request: {err}"))
                    .with_cause(err.to_string()),
            ),
        };

        self.trace_phase(AttemptPhase::Resolving, &context);
        let outcome = self.resolve(&entity, outcome, &context);
        report(outcome, AttemptPhase::Resolving)
    }

    fn resolve(
        &self,
        entity: &H::Entity,
        outcome: SyncOutcome<H::Response>,
        context: &SyncContext,
    ) -> AttemptOutcome {
        let config = self.handler.config();

        match outcome {
            SyncOutcome::Success(response) => {
                let result = self.handler.on_sync_success(entity, &response, context);
                self.check_callback("on_sync_success", context, result);
                self.emit(context, LogEntry::new("SYNC_SUCCESS", "entity synced"));
                AttemptOutcome::Succeeded
            }
            SyncOutcome::Retryable(error) => {
                if context.attempt >= config.max_retries {
                    let error = PermanentError::max_retries_exceeded(error, context.attempt + 1);
                    let result = self.handler.on_sync_error(entity, &error, context);
                    self.check_callback("on_sync_error", context, result);
                    self.emit(
                        context,
                        LogEntry::new("MAX_RETRIES_EXCEEDED", "retry budget exhausted")
                            .with_error(&error.message),
                    );
                    AttemptOutcome::failed(&error)
                } else {
                    self.emit(
                        context,
                        LogEntry::new("SYNC_RETRY", "transient failure, retry scheduled")
                            .with_error(&error.message)
                            .with_field("http_code", fmt_code(error.http_code)),
                    );
                    AttemptOutcome::RetryScheduled {
                        message: error.message,
                    }
                }
            }
            SyncOutcome::Permanent(error) => {
                let result = self.handler.on_sync_error(entity, &error, context);
                self.check_callback("on_sync_error", context, result);
                self.emit(
                    context,
                    LogEntry::new("SYNC_FAILED", "permanent failure")
                        .with_error(&error.message)
                        .with_field("error_code", &error.error_code),
                );
                AttemptOutcome::failed(&error)
            }
            SyncOutcome::Conflict(conflict) => {
                let result = self.handler.on_conflict(entity, &conflict, context);
                self.check_callback("on_conflict", context, result);
                if conflict.conflict_type.is_idempotent_success() {
                    self.emit(
                        context,
                        LogEntry::new("SYNC_DUPLICATE", "entity already exists on server")
                            .with_field("conflict_type", conflict.conflict_type),
                    );
                    AttemptOutcome::Succeeded
                } else {
                    self.emit(
                        context,
                        LogEntry::new("SYNC_CONFLICT", "business conflict")
                            .with_error(&conflict.message)
                            .with_field("conflict_type", conflict.conflict_type),
                    );
                    AttemptOutcome::FailedPermanently {
                        error_code: conflict.error_code(),
                        message: conflict.message,
                    }
                }
            }
            SyncOutcome::Cancelled => {
                self.emit(context, LogEntry::new("SYNC_CANCELLED", "attempt cancelled"));
                AttemptOutcome::Cancelled
            }
        }
    }

    /// The local store failed before we had an entity to report to.
    fn local_failure_without_entity(
        &self,
        context: &SyncContext,
        err: &SyncError,
    ) -> AttemptOutcome {
        let message = format!("could not load entity: {err}");
        if context.attempt >= self.handler.config().max_retries {
            let error = PermanentError::max_retries_exceeded(
                RetryableError::new(message).with_cause(err.to_string()),
                context.attempt + 1,
            );
            self.emit(
                context,
                LogEntry::new("MAX_RETRIES_EXCEEDED", "retry budget exhausted")
                    .with_error(&error.message),
            );
            AttemptOutcome::failed(&error)
        } else {
            self.emit(
                context,
                LogEntry::new("SYNC_RETRY", "local read failed, retry scheduled")
                    .with_error(&message),
            );
            AttemptOutcome::RetryScheduled { message }
        }
    }

    fn check_callback(&self, name: &str, context: &SyncContext, result: SyncResult<()>) {
        if let Err(err) = result {
            self.emit(
                context,
                LogEntry::new("CALLBACK_FAILED", format!("{name} failed, outcome kept"))
                    .with_error(err.to_string()),
            );
        }
    }

    fn trace_phase(&self, phase: AttemptPhase, context: &SyncContext) {
        if self.handler.config().logging_enabled {
            tracing::trace!(
                tag = %self.handler.config().log_tag,
                entity_id = %context.entity_id,
                attempt = context.attempt,
                ?phase,
                "sync phase"
            );
        }
    }

    fn emit(&self, context: &SyncContext, entry: LogEntry) {
        let config = self.handler.config();
        let entry = entry
            .with_field("entity_type", self.handler.entity_type())
            .with_field("entity_id", &context.entity_id)
            .with_field("operation", context.operation_kind)
            .with_field("attempt", context.attempt);

        if config.logging_enabled {
            match &entry.error {
                Some(error) => tracing::warn!(
                    tag = %config.log_tag,
                    action = %entry.action,
                    entity_id = %context.entity_id,
                    attempt = context.attempt,
                    error = %error,
                    "{}",
                    entry.message
                ),
                None => tracing::info!(
                    tag = %config.log_tag,
                    action = %entry.action,
                    entity_id = %context.entity_id,
                    attempt = context.attempt,
                    "{}",
                    entry.message
                ),
            }
        }

        self.logger.log(&entry);
    }
}

fn fmt_code(code: Option<u16>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "-".into())
}

impl<H: EntityHandler> JobExecutor for SyncWorker<H> {
    fn entity_type(&self) -> &str {
        self.handler.entity_type()
    }

    fn config(&self) -> &SyncConfig {
        self.handler.config()
    }

    fn additional_data(&self, entity_id: &str) -> BTreeMap<String, String> {
        self.handler.additional_worker_data(entity_id)
    }

    fn execute(&self, input: &JobInput, attempt: u32) -> AttemptReport {
        self.run(input, attempt)
    }
}
