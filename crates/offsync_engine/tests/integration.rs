//! Integration tests for the queue, runner and worker together.

use offsync_engine::{
    Clock, EnqueueOutcome, ExistingJobPolicy, HttpResponse, JobStatus, NetworkRequirement,
    NetworkState, RemoteError, SyncConfig,
};
use offsync_protocol::{Conflict, ConflictType, OperationKind, SyncOutcome, SyncStatus};
use offsync_testkit::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const PAYMENT: &str = "Payment";

fn payment_config() -> SyncConfig {
    SyncConfig::new(PAYMENT).with_retry_delays(Duration::from_secs(1), Duration::from_secs(4))
}

fn scripted_runtime(handler: ScriptedHandler) -> (TestRuntime, Arc<ScriptedHandler>) {
    let runtime = TestRuntime::memory();
    let handler = Arc::new(handler);
    runtime.runner.register(handler.clone()).unwrap();
    (runtime, handler)
}

/// Runs every attempt the job will ever make, jumping the clock past each
/// backoff delay.
fn run_to_completion(runtime: &TestRuntime) -> usize {
    let mut attempts = 0;
    for _ in 0..16 {
        attempts += runtime.runner.drain();
        runtime.advance(Duration::from_secs(60));
    }
    attempts
}

fn failed_code(status: Option<JobStatus>) -> Option<String> {
    match status {
        Some(JobStatus::Failed { error_code, .. }) => Some(error_code),
        _ => None,
    }
}

#[test]
fn keep_policy_yields_single_job() {
    let (runtime, _) = scripted_runtime(ScriptedHandler::new(payment_config()));

    let first = runtime
        .runner
        .enqueue(PAYMENT, "p-1", OperationKind::Create, ExistingJobPolicy::Keep);
    let second = runtime
        .runner
        .enqueue(PAYMENT, "p-1", OperationKind::Create, ExistingJobPolicy::Keep);

    assert_eq!(first, EnqueueOutcome::Enqueued);
    assert_eq!(second, EnqueueOutcome::Kept);
    assert_eq!(runtime.queue().pending_work(PAYMENT).len(), 1);
}

#[test]
fn retry_budget_allows_exactly_max_plus_one_attempts() {
    let handler = ScriptedHandler::new(payment_config().with_max_retries(3))
        .script([SyncOutcome::retryable("gateway busy")]);
    let (runtime, handler) = scripted_runtime(handler);

    runtime
        .runner
        .enqueue(PAYMENT, "p-1", OperationKind::Create, ExistingJobPolicy::Keep);

    assert_eq!(run_to_completion(&runtime), 4);
    let attempts: Vec<u32> = handler
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            HandlerCall::Execute(_, attempt) => Some(attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![0, 1, 2, 3]);
    assert_eq!(
        failed_code(runtime.queue().status(&payment_config(), "p-1")).as_deref(),
        Some("MAX_RETRIES_EXCEEDED")
    );
    assert_eq!(
        handler.calls().last(),
        Some(&HandlerCall::Error("p-1".into(), "MAX_RETRIES_EXCEEDED".into()))
    );
}

#[test]
fn zero_retries_means_single_attempt() {
    let handler = ScriptedHandler::new(payment_config().with_max_retries(0))
        .script([SyncOutcome::retryable("timeout")]);
    let (runtime, handler) = scripted_runtime(handler);
    runtime
        .runner
        .enqueue(PAYMENT, "p-1", OperationKind::Create, ExistingJobPolicy::Keep);

    assert_eq!(run_to_completion(&runtime), 1);
    assert_eq!(handler.execute_count(), 1);
}

#[test]
fn retry_waits_for_backoff_delay() {
    let handler = ScriptedHandler::new(payment_config())
        .script([SyncOutcome::retryable("busy"), SyncOutcome::Success(())]);
    let (runtime, _) = scripted_runtime(handler);
    runtime
        .runner
        .enqueue(PAYMENT, "p-1", OperationKind::Create, ExistingJobPolicy::Keep);

    assert_eq!(runtime.runner.tick(), 1);
    assert_eq!(runtime.runner.tick(), 0);

    runtime.advance(Duration::from_millis(999));
    assert_eq!(runtime.runner.tick(), 0);

    runtime.advance(Duration::from_millis(1));
    assert_eq!(runtime.runner.tick(), 1);
    assert_eq!(
        runtime.queue().status(&payment_config(), "p-1"),
        Some(JobStatus::Succeeded)
    );
}

#[test]
fn duplicate_conflict_is_success_after_retries() {
    let handler = ScriptedHandler::new(payment_config()).script([
        SyncOutcome::retryable("timeout"),
        SyncOutcome::retryable("timeout"),
        SyncOutcome::Conflict(Conflict::new("ya existe", ConflictType::Duplicate)),
    ]);
    let (runtime, handler) = scripted_runtime(handler);
    runtime
        .runner
        .enqueue(PAYMENT, "p-1", OperationKind::Create, ExistingJobPolicy::Keep);

    assert_eq!(run_to_completion(&runtime), 3);
    assert_eq!(
        runtime.queue().status(&payment_config(), "p-1"),
        Some(JobStatus::Succeeded)
    );
    assert!(handler
        .calls()
        .contains(&HandlerCall::Conflict("p-1".into(), "CONFLICT_DUPLICATE".into())));
}

#[test]
fn blank_entity_id_fails_on_first_attempt() {
    let (runtime, handler) = scripted_runtime(ScriptedHandler::new(payment_config()));
    let config = payment_config();
    runtime
        .queue()
        .enqueue(&config, "   ", OperationKind::Create, Vec::new(), ExistingJobPolicy::Keep);

    assert_eq!(run_to_completion(&runtime), 1);
    assert_eq!(handler.execute_count(), 0);
    assert_eq!(
        failed_code(runtime.queue().status(&config, "   ")).as_deref(),
        Some("MISSING_ENTITY_ID")
    );
    assert_eq!(runtime.logger.actions(), vec!["INVALID_INPUT"]);
}

#[test]
fn precondition_veto_cancels_without_remote_call() {
    let (runtime, handler) = scripted_runtime(ScriptedHandler::new(payment_config()));
    handler.veto_all(true);
    runtime
        .runner
        .enqueue(PAYMENT, "p-1", OperationKind::Update, ExistingJobPolicy::Keep);

    assert_eq!(run_to_completion(&runtime), 1);
    assert!(handler.calls().is_empty());
    assert_eq!(
        runtime.queue().status(&payment_config(), "p-1"),
        Some(JobStatus::Cancelled)
    );
}

#[test]
fn missing_entity_fails_without_callbacks() {
    let (runtime, handler) = scripted_runtime(ScriptedHandler::new(payment_config()));
    handler.mark_missing("p-gone");
    runtime
        .runner
        .enqueue(PAYMENT, "p-gone", OperationKind::Delete, ExistingJobPolicy::Keep);

    run_to_completion(&runtime);
    assert!(handler.calls().is_empty());
    assert_eq!(
        failed_code(runtime.queue().status(&payment_config(), "p-gone")).as_deref(),
        Some("ENTITY_NOT_FOUND")
    );
}

#[test]
fn sale_service_unavailable_exhausts_budget() {
    let (runtime, store, client) = sale_runtime();
    store.insert(Sale::new("s-1", 2500));
    client.push_reply(Ok(HttpResponse::new(503, "")));

    runtime
        .runner
        .enqueue(SALE, "s-1", OperationKind::Create, ExistingJobPolicy::Keep);

    assert_eq!(run_to_completion(&runtime), 4);
    assert_eq!(client.requests().len(), 4);

    let sale = store.get("s-1").unwrap();
    assert_eq!(sale.status, SyncStatus::Error);
    assert!(sale
        .last_error
        .unwrap()
        .starts_with("MAX_RETRIES_EXCEEDED"));
    assert_eq!(
        runtime.logger.actions(),
        vec!["SYNC_RETRY", "SYNC_RETRY", "SYNC_RETRY", "MAX_RETRIES_EXCEEDED"]
    );
}

#[test]
fn sale_duplicate_conflict_counts_as_synced() {
    let (runtime, store, client) = sale_runtime();
    store.insert(Sale::new("s-1", 2500));
    client.push_reply(Ok(HttpResponse::new(409, r#"{"error":"duplicado"}"#)));

    runtime
        .runner
        .enqueue(SALE, "s-1", OperationKind::Create, ExistingJobPolicy::Keep);
    run_to_completion(&runtime);

    assert_eq!(store.get("s-1").unwrap().status, SyncStatus::Synced);
    assert_eq!(
        runtime.queue().status(&SyncConfig::new(SALE), "s-1"),
        Some(JobStatus::Succeeded)
    );
}

#[test]
fn sale_stock_conflict_fails_with_conflict_code() {
    let (runtime, store, client) = sale_runtime();
    store.insert(Sale::new("s-1", 2500));
    client.push_reply(Ok(HttpResponse::new(409, r#"{"mensaje":"Stock insuficiente"}"#)));

    runtime
        .runner
        .enqueue(SALE, "s-1", OperationKind::Create, ExistingJobPolicy::Keep);
    run_to_completion(&runtime);

    let sale = store.get("s-1").unwrap();
    assert_eq!(sale.status, SyncStatus::Error);
    assert_eq!(sale.last_error.as_deref(), Some("CONFLICT_INSUFFICIENT_STOCK"));
    assert_eq!(
        failed_code(runtime.queue().status(&SyncConfig::new(SALE), "s-1")).as_deref(),
        Some("CONFLICT_INSUFFICIENT_STOCK")
    );
}

#[test]
fn sale_validation_error_is_permanent() {
    let (runtime, store, client) = sale_runtime();
    store.insert(Sale::new("s-1", 0));
    client.push_reply(Ok(HttpResponse::new(422, r#"{"error":"total must be positive"}"#)));

    runtime
        .runner
        .enqueue(SALE, "s-1", OperationKind::Create, ExistingJobPolicy::Keep);

    assert_eq!(run_to_completion(&runtime), 1);
    assert_eq!(
        failed_code(runtime.queue().status(&SyncConfig::new(SALE), "s-1")).as_deref(),
        Some("HTTP_422")
    );
}

#[test]
fn sale_network_failure_then_success() {
    let (runtime, store, client) = sale_runtime();
    store.insert(Sale::new("s-1", 990));
    client.push_reply(Err(RemoteError::UnresolvedHost("pos.example.com".into())));
    client.push_reply(Ok(HttpResponse::new(201, r#"{"id": 5}"#)));

    runtime
        .runner
        .enqueue(SALE, "s-1", OperationKind::Create, ExistingJobPolicy::Keep);

    assert_eq!(run_to_completion(&runtime), 2);
    let sale = store.get("s-1").unwrap();
    assert_eq!(sale.status, SyncStatus::Synced);
    assert_eq!(sale.server_id, Some(5));
}

#[test]
fn local_read_failure_is_retried() {
    let (runtime, store, client) = sale_runtime();
    store.insert(Sale::new("s-1", 990));
    store.break_reads("s-1");
    client.push_reply(Ok(HttpResponse::new(201, "{}")));

    runtime
        .runner
        .enqueue(SALE, "s-1", OperationKind::Create, ExistingJobPolicy::Keep);

    assert_eq!(run_to_completion(&runtime), 4);
    assert!(client.requests().is_empty());
    assert_eq!(
        failed_code(runtime.queue().status(&SyncConfig::new(SALE), "s-1")).as_deref(),
        Some("MAX_RETRIES_EXCEEDED")
    );
}

#[test]
fn network_requirement_gates_dispatch() {
    let config = payment_config().with_network_requirement(NetworkRequirement::Unmetered);
    let (runtime, handler) = scripted_runtime(ScriptedHandler::new(config));
    runtime
        .runner
        .enqueue(PAYMENT, "p-1", OperationKind::Create, ExistingJobPolicy::Keep);

    runtime.set_network(NetworkState::Offline);
    assert_eq!(runtime.runner.tick(), 0);
    runtime.set_network(NetworkState::Metered);
    assert_eq!(runtime.runner.tick(), 0);
    runtime.set_network(NetworkState::Unmetered);
    assert_eq!(runtime.runner.tick(), 1);
    assert_eq!(handler.execute_count(), 1);
}

#[test]
fn replace_while_in_flight_discards_stale_result() {
    let handler = ScriptedHandler::new(payment_config());
    handler.hold();
    let (runtime, handler) = scripted_runtime(handler);
    runtime
        .runner
        .enqueue(PAYMENT, "p-1", OperationKind::Create, ExistingJobPolicy::Keep);

    thread::scope(|scope| {
        let first = scope.spawn(|| runtime.runner.tick());
        assert!(handler.wait_entered(1, Duration::from_secs(5)));

        let outcome = runtime
            .runner
            .enqueue(PAYMENT, "p-1", OperationKind::Update, ExistingJobPolicy::Replace);
        assert_eq!(outcome, EnqueueOutcome::Replaced);

        // The key is busy, so the replacement must wait.
        assert_eq!(runtime.runner.tick(), 0);

        handler.release();
        assert_eq!(first.join().unwrap(), 1);
    });

    let pending = runtime.queue().pending_work(PAYMENT);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].operation, OperationKind::Update);
    assert_eq!(
        pending[0].status,
        JobStatus::Enqueued {
            attempt_count: 0,
            next_attempt_at: runtime.clock.now_millis()
        }
    );

    assert_eq!(runtime.runner.tick(), 1);
    assert_eq!(
        runtime.queue().status(&payment_config(), "p-1"),
        Some(JobStatus::Succeeded)
    );
}

#[test]
fn cancel_all_clears_entity_type() {
    let (runtime, _) = scripted_runtime(ScriptedHandler::new(payment_config()));
    runtime
        .queue()
        .enqueue_batch(&payment_config(), &["a", "b"], OperationKind::Create, |_| {
            Default::default()
        });

    assert_eq!(runtime.queue().cancel_all(PAYMENT), 2);
    assert_eq!(runtime.runner.tick(), 0);
    assert!(!runtime.runner.cancel(PAYMENT, "a"));
}

#[test]
fn file_queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue");

    {
        let runtime = TestRuntime::file(&path).unwrap();
        let handler = ScriptedHandler::new(payment_config());
        runtime.runner.register(Arc::new(handler)).unwrap();
        runtime
            .runner
            .enqueue(PAYMENT, "p-1", OperationKind::Create, ExistingJobPolicy::Keep);
        runtime
            .runner
            .enqueue(PAYMENT, "p-2", OperationKind::Update, ExistingJobPolicy::Keep);
    }

    let runtime = TestRuntime::file(&path).unwrap();
    let pending = runtime.queue().pending_work(PAYMENT);
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[1].entity_id.as_deref(), Some("p-2"));
    assert_eq!(pending[1].operation, OperationKind::Update);

    let handler = Arc::new(ScriptedHandler::new(payment_config()));
    runtime.runner.register(handler.clone()).unwrap();
    assert_eq!(runtime.runner.drain(), 2);
    assert_eq!(handler.execute_count(), 2);
    assert!(runtime.queue().pending_work(PAYMENT).is_empty());
}
