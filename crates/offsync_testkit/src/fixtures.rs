//! Test fixtures: an in-memory sale store, its handler and a runtime
//! wired with manual clock and network.

use offsync_engine::{
    EntityHandler, FileJobStore, HttpTransport, JobStore, ManualClock, MemoryJobStore,
    MemoryLogger, MockHttpClient, NetworkState, RunnerConfig, StaticNetworkMonitor, SyncConfig,
    SyncError, SyncQueue, SyncResult, SyncRunner,
};
use offsync_protocol::{
    Conflict, Operation, OperationKind, PermanentError, SyncContext, SyncOutcome, SyncStatus,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Entity type served by [`SaleHandler`].
pub const SALE: &str = "Sale";

/// A point-of-sale ticket recorded offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    /// Local ID.
    pub id: String,
    /// Total in cents.
    pub total_cents: u64,
    /// Sync lifecycle.
    pub status: SyncStatus,
    /// ID assigned by the server once synced.
    pub server_id: Option<u64>,
    /// Last permanent error.
    pub last_error: Option<String>,
}

impl Sale {
    /// Creates a sale pending creation.
    pub fn new(id: impl Into<String>, total_cents: u64) -> Self {
        Self {
            id: id.into(),
            total_cents,
            status: SyncStatus::PendingCreate,
            server_id: None,
            last_error: None,
        }
    }
}

/// The local sale table.
#[derive(Debug, Default)]
pub struct SaleStore {
    sales: RwLock<HashMap<String, Sale>>,
    /// IDs whose reads fail, to simulate a locked database.
    broken: RwLock<Vec<String>>,
}

impl SaleStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a sale.
    pub fn insert(&self, sale: Sale) {
        self.sales.write().insert(sale.id.clone(), sale);
    }

    /// Returns a sale.
    pub fn get(&self, id: &str) -> Option<Sale> {
        self.sales.read().get(id).cloned()
    }

    /// Deletes a sale.
    pub fn remove(&self, id: &str) -> Option<Sale> {
        self.sales.write().remove(id)
    }

    /// Makes reads of `id` fail.
    pub fn break_reads(&self, id: &str) {
        self.broken.write().push(id.to_string());
    }

    fn load(&self, id: &str) -> SyncResult<Option<Sale>> {
        if self.broken.read().iter().any(|b| b == id) {
            return Err(SyncError::local(format!("sale table locked reading {id}")));
        }
        Ok(self.get(id))
    }

    fn update(&self, id: &str, change: impl FnOnce(&mut Sale) -> SyncResult<()>) -> SyncResult<()> {
        let mut sales = self.sales.write();
        let sale = sales
            .get_mut(id)
            .ok_or_else(|| SyncError::local(format!("sale {id} vanished")))?;
        change(sale)
    }
}

/// Wire body of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRequest {
    /// Local ID, used by the server for idempotency.
    pub local_id: String,
    /// Total in cents.
    pub total_cents: u64,
    /// Cashier terminal, from the job's extra input.
    pub terminal: Option<String>,
}

/// Server answer to a sale mutation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SaleResponse {
    /// Server-side ID.
    #[serde(default)]
    pub id: Option<u64>,
}

/// Handler syncing [`Sale`]s through a mock HTTP API.
pub struct SaleHandler {
    config: SyncConfig,
    store: Arc<SaleStore>,
    api: HttpTransport<Arc<MockHttpClient>>,
}

impl SaleHandler {
    /// Creates a handler with a fast-retry config.
    pub fn new(store: Arc<SaleStore>, client: Arc<MockHttpClient>) -> Self {
        let config = SyncConfig::new(SALE)
            .with_retry_delays(Duration::from_secs(1), Duration::from_secs(8));
        Self::with_config(config, store, client)
    }

    /// Creates a handler with an explicit config.
    pub fn with_config(
        config: SyncConfig,
        store: Arc<SaleStore>,
        client: Arc<MockHttpClient>,
    ) -> Self {
        Self {
            config,
            store,
            api: HttpTransport::new("https://pos.example.com/api", client),
        }
    }
}

impl EntityHandler for SaleHandler {
    type Entity = Sale;
    type Request = SaleRequest;
    type Response = SaleResponse;

    fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn get_entity(&self, entity_id: &str) -> SyncResult<Option<Sale>> {
        self.store.load(entity_id)
    }

    fn on_before_sync(&self, entity: &Sale, _operation: &Operation) -> bool {
        entity.status != SyncStatus::Synced
    }

    fn prepare_request(&self, entity: &Sale, context: &SyncContext) -> SyncResult<SaleRequest> {
        if entity.status.needs_sync() {
            self.store.update(&entity.id, |sale| {
                sale.status = sale.status.transition(SyncStatus::Syncing)?;
                Ok(())
            })?;
        }
        Ok(SaleRequest {
            local_id: entity.id.clone(),
            total_cents: entity.total_cents,
            terminal: context.extra("terminal").map(str::to_string),
        })
    }

    fn execute_sync(
        &self,
        request: SaleRequest,
        context: &SyncContext,
    ) -> SyncOutcome<SaleResponse> {
        let path = format!("/sales/{}", request.local_id);
        let result = match context.operation_kind {
            OperationKind::Create => self.api.post_json("/sales", &request),
            OperationKind::Update => self.api.put_json(&path, &request),
            OperationKind::Delete => self.api.delete::<()>(&path).map(|()| SaleResponse::default()),
        };
        self.classify(result)
    }

    fn on_sync_success(
        &self,
        entity: &Sale,
        response: &SaleResponse,
        _: &SyncContext,
    ) -> SyncResult<()> {
        self.store.update(&entity.id, |sale| {
            sale.status = sale.status.transition(SyncStatus::Synced)?;
            sale.server_id = response.id.or(sale.server_id);
            sale.last_error = None;
            Ok(())
        })
    }

    fn on_sync_error(
        &self,
        entity: &Sale,
        error: &PermanentError,
        _: &SyncContext,
    ) -> SyncResult<()> {
        self.store.update(&entity.id, |sale| {
            sale.status = SyncStatus::Error;
            sale.last_error = Some(format!("{}: {}", error.error_code, error.message));
            Ok(())
        })
    }

    fn on_conflict(&self, entity: &Sale, conflict: &Conflict, _: &SyncContext) -> SyncResult<()> {
        self.store.update(&entity.id, |sale| {
            if conflict.conflict_type.is_idempotent_success() {
                sale.status = SyncStatus::Synced;
                sale.last_error = None;
            } else {
                sale.status = SyncStatus::Error;
                sale.last_error = Some(conflict.error_code());
            }
            Ok(())
        })
    }

    fn additional_worker_data(&self, _entity_id: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("terminal".to_string(), "T-01".to_string())])
    }
}

/// A runner over a manual clock and a settable network.
pub struct TestRuntime {
    /// Scheduling clock, starts at 1_000_000 ms.
    pub clock: Arc<ManualClock>,
    /// Network state seen by the runner.
    pub network: Arc<StaticNetworkMonitor>,
    /// Structured log sink shared by all workers.
    pub logger: Arc<MemoryLogger>,
    /// Runner owning the queue.
    pub runner: SyncRunner,
}

impl TestRuntime {
    /// Creates a runtime over a volatile job store.
    pub fn memory() -> Self {
        Self::with_store(Arc::new(MemoryJobStore::new()))
    }

    /// Creates a runtime over a file job store in `dir`.
    pub fn file(dir: &Path) -> SyncResult<Self> {
        Ok(Self::with_store(Arc::new(FileJobStore::open(dir, true)?)))
    }

    /// Creates a runtime over any job store.
    pub fn with_store(store: Arc<dyn JobStore>) -> Self {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let network = Arc::new(StaticNetworkMonitor::new(NetworkState::Unmetered));
        let logger = Arc::new(MemoryLogger::new());
        let queue = Arc::new(SyncQueue::new(store, clock.clone()));
        let runner = SyncRunner::new(queue, network.clone())
            .with_config(RunnerConfig::default().with_workers(4))
            .with_logger(logger.clone());
        Self {
            clock,
            network,
            logger,
            runner,
        }
    }

    /// Returns the queue.
    pub fn queue(&self) -> &SyncQueue {
        self.runner.queue()
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Sets the network state.
    pub fn set_network(&self, state: NetworkState) {
        self.network.set(state);
    }
}

/// Creates a file-backed runtime in a temporary directory.
///
/// Keep the returned directory alive as long as the runtime.
pub fn temp_file_runtime() -> (TempDir, TestRuntime) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let runtime = TestRuntime::file(&dir.path().join("queue")).expect("Failed to open job store");
    (dir, runtime)
}

/// Registers a [`SaleHandler`] on a fresh runtime and returns all parts.
pub fn sale_runtime() -> (TestRuntime, Arc<SaleStore>, Arc<MockHttpClient>) {
    let runtime = TestRuntime::memory();
    let store = Arc::new(SaleStore::new());
    let client = Arc::new(MockHttpClient::new());
    let handler = SaleHandler::new(store.clone(), client.clone());
    runtime
        .runner
        .register(Arc::new(handler))
        .expect("Sale handler config should be valid");
    (runtime, store, client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_engine::{ExistingJobPolicy, HttpResponse, JobStatus};

    #[test]
    fn sale_syncs_and_records_server_id() {
        let (runtime, store, client) = sale_runtime();
        store.insert(Sale::new("s-1", 1500));
        client.push_reply(Ok(HttpResponse::new(201, r#"{"id": 77}"#)));

        runtime
            .runner
            .enqueue(SALE, "s-1", OperationKind::Create, ExistingJobPolicy::Keep);
        assert_eq!(runtime.runner.drain(), 1);

        let sale = store.get("s-1").unwrap();
        assert_eq!(sale.status, SyncStatus::Synced);
        assert_eq!(sale.server_id, Some(77));

        let sent: SaleRequest = match &client.requests()[0].body {
            offsync_engine::HttpBody::Json(bytes) => serde_json::from_slice(bytes).unwrap(),
            other => panic!("unexpected body {other:?}"),
        };
        assert_eq!(sent.terminal.as_deref(), Some("T-01"));
    }

    #[test]
    fn permanent_error_marks_sale() {
        let (runtime, store, client) = sale_runtime();
        store.insert(Sale::new("s-2", 10));
        client.push_reply(Ok(HttpResponse::new(422, r#"{"message":"total below minimum"}"#)));

        runtime
            .runner
            .enqueue(SALE, "s-2", OperationKind::Create, ExistingJobPolicy::Keep);
        runtime.runner.drain();

        let sale = store.get("s-2").unwrap();
        assert_eq!(sale.status, SyncStatus::Error);
        assert_eq!(
            sale.last_error.as_deref(),
            Some("HTTP_422: total below minimum")
        );
        let config = SyncConfig::new(SALE);
        assert!(matches!(
            runtime.queue().status(&config, "s-2"),
            Some(JobStatus::Failed { .. })
        ));
    }
}
