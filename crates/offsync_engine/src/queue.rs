//! Job queue: unique keys, deduplication and backoff scheduling.
//!
//! The queue is the only writer of job records. Callers enqueue and
//! cancel; the runner claims due jobs and completes them with the
//! attempt's report.
//!
//! A completion whose store write fails is kept and applied again before
//! the next claim, so a transient storage error never strands a job in
//! the running state.

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::network::NetworkState;
use crate::store::{Job, JobState, JobStore};
use crate::worker::{AttemptOutcome, AttemptReport};
use offsync_protocol::{JobInput, OperationKind};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// What to do when a job with the same key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingJobPolicy {
    /// Leave the existing job alone.
    #[default]
    Keep,
    /// Supersede the existing job; the attempt counter restarts.
    Replace,
}

/// Result of an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new job was created.
    Enqueued,
    /// A job already existed and was kept.
    Kept,
    /// A job already existed and was superseded.
    Replaced,
    /// The request could not be stored and was dropped (logged).
    Dropped,
}

/// Observable state of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to run.
    Enqueued {
        /// Attempts already finished.
        attempt_count: u32,
        /// Earliest start (unix ms).
        next_attempt_at: u64,
    },
    /// An attempt is in flight.
    Running {
        /// Attempts already finished.
        attempt_count: u32,
    },
    /// Finished successfully.
    Succeeded,
    /// Finished with a permanent failure.
    Failed {
        /// Machine-readable code.
        error_code: String,
        /// Human-readable message.
        message: String,
    },
    /// Cancelled by the caller or by a precondition.
    Cancelled,
}

impl JobStatus {
    fn of_live(job: &Job) -> Self {
        match job.state {
            JobState::Enqueued => JobStatus::Enqueued {
                attempt_count: job.attempt_count,
                next_attempt_at: job.next_attempt_at,
            },
            JobState::Running => JobStatus::Running {
                attempt_count: job.attempt_count,
            },
        }
    }

    fn of_terminal(outcome: &AttemptOutcome) -> Option<Self> {
        match outcome {
            AttemptOutcome::Succeeded => Some(JobStatus::Succeeded),
            AttemptOutcome::FailedPermanently {
                error_code,
                message,
            } => Some(JobStatus::Failed {
                error_code: error_code.clone(),
                message: message.clone(),
            }),
            AttemptOutcome::Cancelled => Some(JobStatus::Cancelled),
            AttemptOutcome::RetryScheduled { .. } => None,
        }
    }
}

/// Read-only view of a live job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    /// Unique key.
    pub key: String,
    /// Entity type.
    pub entity_type: String,
    /// Entity ID from the job input.
    pub entity_id: Option<String>,
    /// Operation kind from the job input.
    pub operation: OperationKind,
    /// Current status.
    pub status: JobStatus,
}

impl JobSnapshot {
    /// Builds a snapshot of a stored job.
    pub fn of(job: &Job) -> Self {
        Self {
            key: job.key.clone(),
            entity_type: job.entity_type.clone(),
            entity_id: job.input.entity_id().map(str::to_string),
            operation: job.input.operation_kind(),
            status: JobStatus::of_live(job),
        }
    }
}

/// A job handed to the runner for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// ID of the claimed job; completion is ignored if it changed.
    pub job_id: Uuid,
    /// Unique key.
    pub key: String,
    /// Entity type.
    pub entity_type: String,
    /// Job input.
    pub input: JobInput,
    /// Zero-based attempt counter.
    pub attempt: u32,
}

/// Terminal statuses remembered by default.
pub const DEFAULT_FINISHED_CAPACITY: usize = 1024;

/// Last terminal status per key, evicting the oldest past `capacity`.
#[derive(Debug)]
struct FinishedStatuses {
    capacity: usize,
    next_seq: u64,
    order: BTreeMap<u64, String>,
    entries: HashMap<String, (u64, JobStatus)>,
}

impl FinishedStatuses {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_seq: 0,
            order: BTreeMap::new(),
            entries: HashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<&JobStatus> {
        self.entries.get(key).map(|(_, status)| status)
    }

    fn insert(&mut self, key: String, status: JobStatus) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some((previous, _)) = self.entries.insert(key.clone(), (seq, status)) {
            self.order.remove(&previous);
        }
        self.order.insert(seq, key);

        while self.entries.len() > self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    fn remove(&mut self, key: &str) {
        if let Some((seq, _)) = self.entries.remove(key) {
            self.order.remove(&seq);
        }
    }
}

/// Result of applying a report to the store.
enum Settlement {
    Applied,
    Discarded,
    Deferred,
}

/// Everything guarded by the queue lock.
struct QueueState {
    finished: FinishedStatuses,
    /// Completions whose store write failed, oldest first.
    unsettled: Vec<(Claim, AttemptReport)>,
}

/// Queue manager over a [`JobStore`].
///
/// Create one per process and share it by `Arc`.
pub struct SyncQueue {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    /// Guards every read-modify-write of the store.
    state: Mutex<QueueState>,
}

impl SyncQueue {
    /// Creates a queue.
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            state: Mutex::new(QueueState {
                finished: FinishedStatuses::new(DEFAULT_FINISHED_CAPACITY),
                unsettled: Vec::new(),
            }),
        }
    }

    /// Sets how many terminal statuses [`status`](Self::status) remembers.
    pub fn with_finished_capacity(self, capacity: usize) -> Self {
        self.state.lock().finished.capacity = capacity;
        self
    }

    /// Returns the clock used for scheduling.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Enqueues sync work for an entity.
    ///
    /// Never fails: storage errors are logged and reported as
    /// [`EnqueueOutcome::Dropped`].
    pub fn enqueue(
        &self,
        config: &SyncConfig,
        entity_id: &str,
        kind: OperationKind,
        extra: impl IntoIterator<Item = (String, String)>,
        policy: ExistingJobPolicy,
    ) -> EnqueueOutcome {
        let entity_id = entity_id.trim();
        let input = match JobInput::new(entity_id, kind, extra) {
            Ok(input) => input,
            Err(err) => {
                tracing::warn!(
                    entity_type = %config.entity_type,
                    entity_id,
                    error = %err,
                    "rejected job input"
                );
                return EnqueueOutcome::Dropped;
            }
        };
        let key = config.job_key(entity_id);

        let mut state = self.state.lock();
        let existing = match self.store.get(&key) {
            Ok(existing) => existing,
            Err(err) => {
                tracing::warn!(
                    key = %key,
                    error = %err,
                    "could not read job store, enqueue dropped"
                );
                return EnqueueOutcome::Dropped;
            }
        };

        let outcome = match (&existing, policy) {
            (Some(_), ExistingJobPolicy::Keep) => {
                tracing::debug!(key = %key, "job already queued, kept");
                return EnqueueOutcome::Kept;
            }
            (Some(_), ExistingJobPolicy::Replace) => EnqueueOutcome::Replaced,
            (None, _) => EnqueueOutcome::Enqueued,
        };

        let now = self.clock.now_millis();
        let job = Job {
            id: Uuid::new_v4(),
            key: key.clone(),
            entity_type: config.entity_type.clone(),
            input,
            network: config.network_requirement,
            backoff: config.backoff(),
            attempt_count: 0,
            next_attempt_at: now,
            state: JobState::Enqueued,
            enqueued_at: now,
        };

        if let Err(err) = self.store.put(job) {
            tracing::warn!(key = %key, error = %err, "could not persist job, enqueue dropped");
            return EnqueueOutcome::Dropped;
        }
        state.finished.remove(&key);
        tracing::debug!(key = %key, ?outcome, ?kind, "job enqueued");
        outcome
    }

    /// Enqueues one job per entity, always replacing existing ones.
    ///
    /// `extra` supplies per-entity input.
    pub fn enqueue_batch<S, F>(
        &self,
        config: &SyncConfig,
        entity_ids: &[S],
        kind: OperationKind,
        extra: F,
    ) -> Vec<EnqueueOutcome>
    where
        S: AsRef<str>,
        F: Fn(&str) -> BTreeMap<String, String>,
    {
        entity_ids
            .iter()
            .map(|id| {
                let id = id.as_ref();
                self.enqueue(config, id, kind, extra(id), ExistingJobPolicy::Replace)
            })
            .collect()
    }

    /// Cancels the job of one entity. Returns true if a job existed.
    ///
    /// An attempt already in flight finishes, but its result is dropped.
    pub fn cancel(&self, config: &SyncConfig, entity_id: &str) -> bool {
        self.cancel_key(&config.job_key(entity_id))
    }

    /// Cancels a job by unique key. Returns true if a job existed.
    pub fn cancel_key(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        match self.store.remove(key) {
            Ok(Some(_)) => {
                state.finished.insert(key.to_string(), JobStatus::Cancelled);
                tracing::debug!(key, "job cancelled");
                true
            }
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(key, error = %err, "could not cancel job");
                false
            }
        }
    }

    /// Cancels every job of an entity type. Returns how many were removed.
    pub fn cancel_all(&self, entity_type: &str) -> usize {
        let keys: Vec<String> = self
            .jobs_of(entity_type)
            .into_iter()
            .map(|job| job.key)
            .collect();
        keys.iter().filter(|key| self.cancel_key(key)).count()
    }

    /// Returns the status of an entity's job, live or last finished.
    pub fn status(&self, config: &SyncConfig, entity_id: &str) -> Option<JobStatus> {
        let key = config.job_key(entity_id);
        let state = self.state.lock();
        match self.store.get(&key) {
            Ok(Some(job)) => Some(JobStatus::of_live(&job)),
            Ok(None) => state.finished.get(&key).cloned(),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "could not read job status");
                None
            }
        }
    }

    /// Returns the live jobs of an entity type.
    pub fn pending_work(&self, entity_type: &str) -> Vec<JobSnapshot> {
        self.jobs_of(entity_type).iter().map(JobSnapshot::of).collect()
    }

    fn jobs_of(&self, entity_type: &str) -> Vec<Job> {
        match self.store.list() {
            Ok(jobs) => jobs
                .into_iter()
                .filter(|job| job.entity_type == entity_type)
                .collect(),
            Err(err) => {
                tracing::warn!(entity_type, error = %err, "could not list jobs");
                Vec::new()
            }
        }
    }

    /// Marks up to `limit` due jobs as running and returns them.
    ///
    /// Skips keys in `busy` and jobs whose network requirement `network`
    /// does not satisfy. Earliest due first. Completions that could not be
    /// written earlier are applied first.
    pub fn claim_due(
        &self,
        network: NetworkState,
        limit: usize,
        busy: &HashSet<String>,
    ) -> Vec<Claim> {
        let mut state = self.state.lock();
        self.settle_unsettled(&mut state);
        if limit == 0 {
            return Vec::new();
        }

        let now = self.clock.now_millis();
        let mut due: Vec<Job> = match self.store.list() {
            Ok(jobs) => jobs
                .into_iter()
                .filter(|job| job.is_due(now))
                .filter(|job| network.satisfies(job.network))
                .filter(|job| !busy.contains(&job.key))
                .collect(),
            Err(err) => {
                tracing::warn!(error = %err, "could not list jobs");
                return Vec::new();
            }
        };
        due.sort_by_key(|job| (job.next_attempt_at, job.enqueued_at));

        let mut claims = Vec::new();
        for mut job in due.into_iter().take(limit) {
            job.state = JobState::Running;
            let claim = Claim {
                job_id: job.id,
                key: job.key.clone(),
                entity_type: job.entity_type.clone(),
                input: job.input.clone(),
                attempt: job.attempt_count,
            };
            match self.store.put(job) {
                Ok(()) => claims.push(claim),
                Err(err) => {
                    tracing::warn!(key = %claim.key, error = %err, "could not claim job")
                }
            }
        }
        claims
    }

    /// Applies the report of a claimed attempt.
    ///
    /// Returns false if the job was cancelled or superseded meanwhile, in
    /// which case the report is discarded. If the store cannot be written,
    /// the job stays running and the report is applied again before the
    /// next claim.
    pub fn complete(&self, claim: &Claim, report: &AttemptReport) -> bool {
        let mut state = self.state.lock();
        match self.settle(&mut state.finished, claim, report) {
            Settlement::Applied => true,
            Settlement::Discarded => false,
            Settlement::Deferred => {
                state.unsettled.retain(|(pending, _)| pending.key != claim.key);
                state.unsettled.push((claim.clone(), report.clone()));
                true
            }
        }
    }

    /// Returns how many completions are waiting for the store to recover.
    pub fn unsettled_count(&self) -> usize {
        self.state.lock().unsettled.len()
    }

    fn settle_unsettled(&self, state: &mut QueueState) {
        if state.unsettled.is_empty() {
            return;
        }
        for (claim, report) in std::mem::take(&mut state.unsettled) {
            if let Settlement::Deferred = self.settle(&mut state.finished, &claim, &report) {
                state.unsettled.push((claim, report));
            } else {
                tracing::debug!(key = %claim.key, "deferred completion applied");
            }
        }
    }

    fn settle(
        &self,
        finished: &mut FinishedStatuses,
        claim: &Claim,
        report: &AttemptReport,
    ) -> Settlement {
        let job = match self.store.get(&claim.key) {
            Ok(Some(job)) if job.id == claim.job_id => job,
            Ok(_) => {
                tracing::debug!(
                    key = %claim.key,
                    "job cancelled or superseded, result discarded"
                );
                return Settlement::Discarded;
            }
            Err(err) => {
                tracing::warn!(key = %claim.key, error = %err, "could not read job");
                return Settlement::Deferred;
            }
        };

        if let Some(status) = JobStatus::of_terminal(&report.outcome) {
            if let Err(err) = self.store.remove(&claim.key) {
                tracing::warn!(key = %claim.key, error = %err, "could not remove finished job");
                return Settlement::Deferred;
            }
            finished.insert(claim.key.clone(), status);
            return Settlement::Applied;
        }

        let now = self.clock.now_millis();
        let delay = job.backoff.delay_for_attempt(job.attempt_count);
        let next = Job {
            attempt_count: job.attempt_count.saturating_add(1),
            next_attempt_at: now.saturating_add(millis(delay)),
            state: JobState::Enqueued,
            ..job
        };
        tracing::debug!(
            key = %claim.key,
            attempt = next.attempt_count,
            delay_ms = millis(delay),
            "retry scheduled"
        );
        if let Err(err) = self.store.put(next) {
            tracing::warn!(key = %claim.key, error = %err, "could not reschedule job");
            return Settlement::Deferred;
        }
        Settlement::Applied
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
