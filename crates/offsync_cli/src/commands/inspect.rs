//! Inspect command implementation.

use offsync_engine::{Clock, JobStore, SystemClock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Queue inspection result.
#[derive(Debug, Default, Serialize)]
pub struct InspectResult {
    /// Queue directory.
    pub path: String,
    /// Live jobs.
    pub job_count: usize,
    /// Jobs whose next attempt may start now.
    pub due_count: usize,
    /// Jobs that already failed at least once.
    pub retrying_count: usize,
    /// Jobs left running by a process that died, reset when the queue
    /// was opened.
    pub recovered_count: usize,
    /// Live jobs per entity type.
    pub by_entity_type: BTreeMap<String, usize>,
}

/// Collects queue statistics. `recovered` is the number of interrupted
/// jobs the store reset on open.
pub fn inspect(
    store: &dyn JobStore,
    path: &Path,
    now: u64,
    recovered: usize,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let jobs = store.list()?;
    let mut result = InspectResult {
        path: path.display().to_string(),
        job_count: jobs.len(),
        recovered_count: recovered,
        ..InspectResult::default()
    };

    for job in &jobs {
        if job.is_due(now) {
            result.due_count += 1;
        }
        if job.attempt_count > 0 {
            result.retrying_count += 1;
        }
        *result.by_entity_type.entry(job.entity_type.clone()).or_insert(0) += 1;
    }

    Ok(result)
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_store(path)?;
    let result = inspect(&store, path, SystemClock.now_millis(), store.recovered_count())?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Queue: {}", result.path);
    println!();
    println!("Jobs:");
    println!("  Live:      {}", result.job_count);
    println!("  Due now:   {}", result.due_count);
    println!("  Retrying:  {}", result.retrying_count);
    if result.recovered_count > 0 {
        println!("  Recovered: {}", result.recovered_count);
    }

    if !result.by_entity_type.is_empty() {
        println!();
        println!("By entity type:");
        for (entity_type, count) in &result.by_entity_type {
            println!("  {entity_type:<20} {count}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_engine::{
        ExistingJobPolicy, FileJobStore, ManualClock, MemoryJobStore, NetworkState, SyncConfig,
        SyncQueue,
    };
    use offsync_protocol::OperationKind;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn counts_jobs_per_type() {
        let store = Arc::new(MemoryJobStore::new());
        let clock = Arc::new(ManualClock::new(10_000));
        let queue = SyncQueue::new(store.clone(), clock.clone());
        let sales = SyncConfig::new("Sale");
        let payments = SyncConfig::new("Payment");

        queue.enqueue(&sales, "s-1", OperationKind::Create, Vec::new(), ExistingJobPolicy::Keep);
        queue.enqueue(&sales, "s-2", OperationKind::Update, Vec::new(), ExistingJobPolicy::Keep);
        clock.advance(Duration::from_secs(1));
        queue.enqueue(&payments, "p-1", OperationKind::Create, Vec::new(), ExistingJobPolicy::Keep);

        let result = inspect(store.as_ref(), Path::new("queue"), 10_500, 0).unwrap();
        assert_eq!(result.job_count, 3);
        assert_eq!(result.due_count, 2);
        assert_eq!(result.retrying_count, 0);
        assert_eq!(result.by_entity_type.get("Sale"), Some(&2));
        assert_eq!(result.by_entity_type.get("Payment"), Some(&1));
    }

    #[test]
    fn reports_jobs_reset_after_a_crash() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("queue");
        {
            let store = Arc::new(FileJobStore::open(&path, true).unwrap());
            let queue = SyncQueue::new(store, Arc::new(ManualClock::new(0)));
            queue.enqueue(
                &SyncConfig::new("Sale"),
                "s-1",
                OperationKind::Create,
                Vec::new(),
                ExistingJobPolicy::Keep,
            );
            let claims = queue.claim_due(NetworkState::Unmetered, 1, &HashSet::new());
            assert_eq!(claims.len(), 1);
        }

        let store = super::super::open_store(&path).unwrap();
        let result = inspect(&store, &path, 0, store.recovered_count()).unwrap();
        assert_eq!(result.job_count, 1);
        assert_eq!(result.due_count, 1);
        assert_eq!(result.recovered_count, 1);
    }
}
