//! Worker pool that drives the queue.
//!
//! Each tick claims due jobs whose network requirement is met, runs them
//! concurrently on scoped threads and hands the reports back to the queue.
//! A slot freed by a finished attempt is refilled within the same tick.
//! [`SyncRunner::start`] runs ticks on a background thread.
//!
//! A handler that panics fails its job permanently with
//! `HANDLER_PANICKED`; the panic never reaches the polling thread.

use crate::error::{SyncError, SyncResult};
use crate::handler::EntityHandler;
use crate::logger::{LogEntry, SyncLogger, TracingLogger};
use crate::network::NetworkMonitor;
use crate::queue::{Claim, EnqueueOutcome, ExistingJobPolicy, SyncQueue};
use crate::worker::{AttemptOutcome, AttemptPhase, AttemptReport, JobExecutor, SyncWorker};
use offsync_protocol::{error_codes, OperationKind};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Runner configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Maximum attempts in flight.
    pub workers: usize,
    /// Idle wait between polls.
    pub poll_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl RunnerConfig {
    /// Sets the number of concurrent attempts.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the idle poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Dispatches queued jobs to the registered handlers.
pub struct SyncRunner {
    queue: Arc<SyncQueue>,
    network: Arc<dyn NetworkMonitor>,
    logger: Arc<dyn SyncLogger>,
    executors: RwLock<HashMap<String, Arc<dyn JobExecutor>>>,
    /// Keys with an attempt in flight.
    in_flight: Mutex<HashSet<String>>,
    config: RunnerConfig,
}

impl SyncRunner {
    /// Creates a runner with default settings.
    pub fn new(queue: Arc<SyncQueue>, network: Arc<dyn NetworkMonitor>) -> Self {
        Self {
            queue,
            network,
            logger: Arc::new(TracingLogger),
            executors: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            config: RunnerConfig::default(),
        }
    }

    /// Sets the runner configuration.
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the structured log sink shared by all workers registered
    /// afterwards.
    pub fn with_logger(mut self, logger: Arc<dyn SyncLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Returns the queue.
    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    /// Registers the handler of an entity type.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the handler's configuration is invalid or
    /// the type is already registered.
    pub fn register<H>(&self, handler: Arc<H>) -> SyncResult<()>
    where
        H: EntityHandler + 'static,
    {
        handler.config().validate()?;
        let worker = SyncWorker::new(handler).with_logger(Arc::clone(&self.logger));
        self.register_executor(Arc::new(worker))
    }

    /// Registers an already type-erased executor.
    pub fn register_executor(&self, executor: Arc<dyn JobExecutor>) -> SyncResult<()> {
        let entity_type = executor.entity_type().to_string();
        let mut executors = self.executors.write();
        if executors.contains_key(&entity_type) {
            return Err(SyncError::InvalidConfig {
                entity_type,
                message: "a handler is already registered".into(),
            });
        }
        tracing::debug!(entity_type = %entity_type, "handler registered");
        executors.insert(entity_type, executor);
        Ok(())
    }

    fn executor(&self, entity_type: &str) -> Option<Arc<dyn JobExecutor>> {
        self.executors.read().get(entity_type).cloned()
    }

    /// Enqueues work for an entity of a registered type, adding the
    /// handler's extra job input.
    pub fn enqueue(
        &self,
        entity_type: &str,
        entity_id: &str,
        kind: OperationKind,
        policy: ExistingJobPolicy,
    ) -> EnqueueOutcome {
        let entity_id = entity_id.trim();
        let Some(executor) = self.executor(entity_type) else {
            tracing::warn!(entity_type, entity_id, "no handler registered, enqueue dropped");
            return EnqueueOutcome::Dropped;
        };
        let extra = executor.additional_data(entity_id);
        self.queue
            .enqueue(executor.config(), entity_id, kind, extra, policy)
    }

    /// Cancels the job of an entity of a registered type.
    pub fn cancel(&self, entity_type: &str, entity_id: &str) -> bool {
        match self.executor(entity_type) {
            Some(executor) => self.queue.cancel(executor.config(), entity_id),
            None => false,
        }
    }

    /// Runs one polling round and returns the number of attempts made.
    ///
    /// Keeps at most `workers` attempts in flight and claims again as
    /// soon as one finishes. Each key is attempted at most once per tick.
    /// Returns once no attempt is in flight and nothing more is due.
    pub fn tick(&self) -> usize {
        let (done_tx, done_rx) = mpsc::channel();
        let mut attempted = HashSet::new();

        thread::scope(|scope| {
            let mut running = 0usize;
            loop {
                let claims = self.claim(&attempted);
                if !claims.is_empty() {
                    tracing::debug!(count = claims.len(), running, "dispatching jobs");
                }
                for claim in claims {
                    running += 1;
                    attempted.insert(claim.key.clone());
                    let slot = Slot {
                        runner: self,
                        key: claim.key.clone(),
                        done: done_tx.clone(),
                    };
                    scope.spawn(move || {
                        let _slot = slot;
                        self.process(&claim);
                    });
                }
                if running == 0 || done_rx.recv().is_err() {
                    break;
                }
                running -= 1;
            }
        });
        attempted.len()
    }

    fn claim(&self, attempted: &HashSet<String>) -> Vec<Claim> {
        let mut in_flight = self.in_flight.lock();
        let free = self.config.workers.saturating_sub(in_flight.len());
        let busy: HashSet<String> = in_flight.union(attempted).cloned().collect();
        let claims = self.queue.claim_due(self.network.state(), free, &busy);
        in_flight.extend(claims.iter().map(|claim| claim.key.clone()));
        claims
    }

    /// Ticks until no job is due. Returns the total number of attempts.
    ///
    /// Jobs rescheduled into the future are not waited for.
    pub fn drain(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.tick();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }

    fn process(&self, claim: &Claim) {
        let report = match self.executor(&claim.entity_type) {
            Some(executor) => panic::catch_unwind(AssertUnwindSafe(|| {
                executor.execute(&claim.input, claim.attempt)
            }))
            .unwrap_or_else(|payload| self.panicked(claim, payload.as_ref())),
            None => self.no_handler(claim),
        };
        self.queue.complete(claim, &report);
    }

    fn panicked(&self, claim: &Claim, payload: &(dyn Any + Send)) -> AttemptReport {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "handler panicked".to_string()
        };
        tracing::error!(
            key = %claim.key,
            attempt = claim.attempt,
            panic = %message,
            "handler panicked"
        );
        self.logger.log(
            &LogEntry::new(error_codes::HANDLER_PANICKED, "handler panicked during attempt")
                .with_error(&message)
                .with_field("entity_type", &claim.entity_type)
                .with_field("key", &claim.key),
        );
        AttemptReport {
            outcome: AttemptOutcome::FailedPermanently {
                error_code: error_codes::HANDLER_PANICKED.to_string(),
                message,
            },
            phase: AttemptPhase::Executing,
            attempt: claim.attempt,
        }
    }

    fn no_handler(&self, claim: &Claim) -> AttemptReport {
        let message = format!("no handler registered for {}", claim.entity_type);
        tracing::warn!(key = %claim.key, entity_type = %claim.entity_type, "no handler registered");
        self.logger.log(
            &LogEntry::new(error_codes::NO_HANDLER, "job has no handler")
                .with_error(&message)
                .with_field("entity_type", &claim.entity_type)
                .with_field("key", &claim.key),
        );
        AttemptReport {
            outcome: AttemptOutcome::FailedPermanently {
                error_code: error_codes::NO_HANDLER.to_string(),
                message,
            },
            phase: AttemptPhase::Started,
            attempt: claim.attempt,
        }
    }

    /// Starts polling on a background thread.
    pub fn start(self: &Arc<Self>) -> SyncResult<RunnerHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let runner = Arc::clone(self);
        let flag = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("offsync-runner".into())
            .spawn(move || {
                tracing::info!(workers = runner.config.workers, "sync runner started");
                while !flag.load(Ordering::Acquire) {
                    if runner.tick() == 0 {
                        thread::park_timeout(runner.config.poll_interval);
                    }
                }
                tracing::info!("sync runner stopped");
            })?;

        Ok(RunnerHandle {
            stop,
            thread: Some(thread),
        })
    }
}

/// One in-flight attempt. Frees its key and reports back when dropped,
/// including on unwind.
struct Slot<'a> {
    runner: &'a SyncRunner,
    key: String,
    done: Sender<()>,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.runner.in_flight.lock().remove(&self.key);
        let _ = self.done.send(());
    }
}

/// Handle to a running background poller. Stops it when dropped.
#[derive(Debug)]
pub struct RunnerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RunnerHandle {
    /// Wakes the poller for an immediate tick.
    pub fn wake(&self) {
        if let Some(thread) = &self.thread {
            thread.thread().unpark();
        }
    }

    /// Stops the poller after its current tick and waits for it.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                tracing::error!("sync runner thread panicked");
            }
        }
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
