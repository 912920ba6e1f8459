//! A handler whose remote outcomes are scripted.
//!
//! Entities are plain IDs; every ID exists unless marked missing. Useful to
//! drive the worker through exact outcome sequences.

use offsync_engine::{EntityHandler, SyncConfig, SyncResult};
use offsync_protocol::{Conflict, Operation, PermanentError, SyncContext, SyncOutcome};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

/// Callback or hook the handler saw, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerCall {
    /// `prepare_request` for an entity at an attempt.
    Prepare(String, u32),
    /// `execute_sync` for an entity at an attempt.
    Execute(String, u32),
    /// `on_sync_success`.
    Success(String),
    /// `on_sync_error` with its error code.
    Error(String, String),
    /// `on_conflict` with its conflict code.
    Conflict(String, String),
}

#[derive(Default)]
struct GateState {
    closed: bool,
    entered: usize,
}

#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

/// Scripted [`EntityHandler`].
pub struct ScriptedHandler {
    config: SyncConfig,
    script: Mutex<VecDeque<SyncOutcome<()>>>,
    calls: Mutex<Vec<HandlerCall>>,
    missing: Mutex<HashSet<String>>,
    veto: Mutex<bool>,
    gate: Gate,
}

impl ScriptedHandler {
    /// Creates a handler that succeeds on every attempt.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            missing: Mutex::new(HashSet::new()),
            veto: Mutex::new(false),
            gate: Gate::default(),
        }
    }

    /// Appends outcomes to the script. The last one repeats.
    pub fn script(self, outcomes: impl IntoIterator<Item = SyncOutcome<()>>) -> Self {
        self.script.lock().extend(outcomes);
        self
    }

    /// Makes `get_entity` report `entity_id` as gone.
    pub fn mark_missing(&self, entity_id: &str) {
        self.missing.lock().insert(entity_id.to_string());
    }

    /// Makes `on_before_sync` veto every attempt.
    pub fn veto_all(&self, veto: bool) {
        *self.veto.lock() = veto;
    }

    /// Makes `execute_sync` block until [`ScriptedHandler::release`].
    pub fn hold(&self) {
        self.gate.state.lock().closed = true;
    }

    /// Unblocks held `execute_sync` calls.
    pub fn release(&self) {
        self.gate.state.lock().closed = false;
        self.gate.changed.notify_all();
    }

    /// Waits until `count` `execute_sync` calls have started.
    ///
    /// Returns false on timeout.
    pub fn wait_entered(&self, count: usize, timeout: Duration) -> bool {
        let mut state = self.gate.state.lock();
        while state.entered < count {
            if self.gate.changed.wait_for(&mut state, timeout).timed_out() {
                return state.entered >= count;
            }
        }
        true
    }

    /// Returns the calls seen so far.
    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls.lock().clone()
    }

    /// Returns how many remote calls were made.
    pub fn execute_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, HandlerCall::Execute(..)))
            .count()
    }

    fn next_outcome(&self) -> SyncOutcome<()> {
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.pop_front().unwrap_or(SyncOutcome::Success(()))
        } else {
            script.front().cloned().unwrap_or(SyncOutcome::Success(()))
        }
    }

    fn wait_gate(&self) {
        let mut state = self.gate.state.lock();
        state.entered += 1;
        self.gate.changed.notify_all();
        while state.closed {
            self.gate.changed.wait(&mut state);
        }
    }

    fn record(&self, call: HandlerCall) {
        self.calls.lock().push(call);
    }
}

impl EntityHandler for ScriptedHandler {
    type Entity = String;
    type Request = ();
    type Response = ();

    fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn get_entity(&self, entity_id: &str) -> SyncResult<Option<String>> {
        if self.missing.lock().contains(entity_id) {
            return Ok(None);
        }
        Ok(Some(entity_id.to_string()))
    }

    fn on_before_sync(&self, _entity: &String, _operation: &Operation) -> bool {
        !*self.veto.lock()
    }

    fn prepare_request(&self, entity: &String, context: &SyncContext) -> SyncResult<()> {
        self.record(HandlerCall::Prepare(entity.clone(), context.attempt));
        Ok(())
    }

    fn execute_sync(&self, _request: (), context: &SyncContext) -> SyncOutcome<()> {
        self.record(HandlerCall::Execute(context.entity_id.clone(), context.attempt));
        self.wait_gate();
        self.next_outcome()
    }

    fn on_sync_success(&self, entity: &String, _: &(), _: &SyncContext) -> SyncResult<()> {
        self.record(HandlerCall::Success(entity.clone()));
        Ok(())
    }

    fn on_sync_error(
        &self,
        entity: &String,
        error: &PermanentError,
        _: &SyncContext,
    ) -> SyncResult<()> {
        self.record(HandlerCall::Error(entity.clone(), error.error_code.clone()));
        Ok(())
    }

    fn on_conflict(&self, entity: &String, conflict: &Conflict, _: &SyncContext) -> SyncResult<()> {
        self.record(HandlerCall::Conflict(entity.clone(), conflict.error_code()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_engine::SyncWorker;
    use offsync_protocol::{JobInput, OperationKind};
    use std::sync::Arc;

    #[test]
    fn script_advances_then_repeats() {
        let handler = ScriptedHandler::new(SyncConfig::new("Payment")).script([
            SyncOutcome::retryable("busy"),
            SyncOutcome::Success(()),
        ]);
        let context = SyncContext::new("p-1", OperationKind::Create, 0);

        assert!(handler.execute_sync((), &context).is_retryable());
        assert!(handler.execute_sync((), &context).is_success());
        assert!(handler.execute_sync((), &context).is_success());
        assert_eq!(handler.execute_count(), 3);
    }

    #[test]
    fn worker_records_callbacks() {
        let handler = Arc::new(ScriptedHandler::new(SyncConfig::new("Payment")));
        let worker = SyncWorker::new(handler.clone());
        let input = JobInput::new("p-1", OperationKind::Create, Vec::new()).unwrap();

        worker.run(&input, 0);
        assert_eq!(
            handler.calls(),
            vec![
                HandlerCall::Prepare("p-1".into(), 0),
                HandlerCall::Execute("p-1".into(), 0),
                HandlerCall::Success("p-1".into()),
            ]
        );
    }
}
