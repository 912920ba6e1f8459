//! # OffSync Engine
//!
//! Offline-first sync orchestration for device-local business entities.
//!
//! This crate provides:
//! - Per-entity-type retry and classification policy ([`SyncConfig`])
//! - Error classification of failed remote calls
//! - The handler contract implemented once per entity type
//! - The attempt state machine ([`SyncWorker`])
//! - A durable job queue with unique keys and exponential backoff
//! - A worker pool that runs due jobs when the network allows
//! - HTTP transport abstraction
//!
//! ## Architecture
//!
//! Local writes happen first; sync is deferred:
//! 1. The app saves an entity locally and enqueues a job for it
//! 2. The runner claims due jobs whose network requirement is met
//! 3. The worker loads the entity, builds a request and calls the server
//! 4. Failures are classified as retryable, permanent or conflict
//! 5. The queue reschedules retryable failures with backoff
//!
//! ## Key Invariants
//!
//! - One live job per `{worker_name_prefix}_{entity_id}` key
//! - A job makes at most `max_retries + 1` attempts
//! - A duplicate conflict counts as success
//! - A superseded attempt never overwrites its replacement

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod classifier;
mod clock;
mod config;
mod error;
mod handler;
mod http;
mod logger;
mod network;
mod queue;
mod runner;
mod store;
mod transport;
mod worker;

pub use classifier::{
    classify, classify_result, default_conflict_type, extract_message, ConflictDetector,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Backoff, NetworkRequirement, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use handler::EntityHandler;
pub use http::{HttpTransport, MULTIPART_DATA_FIELD};
pub use logger::{LogEntry, MemoryLogger, SyncLogger, TracingLogger, SYNC_LOG_MODULE};
pub use network::{NetworkMonitor, NetworkState, StaticNetworkMonitor};
pub use queue::{
    Claim, EnqueueOutcome, ExistingJobPolicy, JobSnapshot, JobStatus, SyncQueue,
    DEFAULT_FINISHED_CAPACITY,
};
pub use runner::{RunnerConfig, RunnerHandle, SyncRunner};
pub use store::{FileJobStore, Job, JobState, JobStore, MemoryJobStore};
pub use transport::{
    HttpBody, HttpClient, HttpMethod, HttpRequest, HttpResponse, MockHttpClient, MultipartPart,
    RemoteError,
};
pub use worker::{AttemptOutcome, AttemptPhase, AttemptReport, JobExecutor, SyncWorker};
