//! List command implementation.

use super::format_due;
use offsync_engine::{Clock, JobSnapshot, JobStatus, JobStore, SystemClock};
use std::path::Path;

/// Returns live jobs, optionally of one entity type.
pub fn collect(
    store: &dyn JobStore,
    entity_type: Option<&str>,
) -> Result<Vec<JobSnapshot>, Box<dyn std::error::Error>> {
    Ok(store
        .list()?
        .iter()
        .filter(|job| entity_type.map_or(true, |t| job.entity_type == t))
        .map(JobSnapshot::of)
        .collect())
}

/// Runs the list command.
pub fn run(
    path: &Path,
    entity_type: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_store(path)?;
    let jobs = collect(&store, entity_type)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }
        _ => {
            let now = SystemClock.now_millis();
            if jobs.is_empty() {
                println!("No pending jobs");
            }
            for job in &jobs {
                println!(
                    "{:<32} {:<8} {}",
                    job.key,
                    job.operation,
                    describe(&job.status, now)
                );
            }
        }
    }

    Ok(())
}

fn describe(status: &JobStatus, now: u64) -> String {
    match status {
        JobStatus::Enqueued {
            attempt_count,
            next_attempt_at,
        } => format!(
            "enqueued, {} attempts, {}",
            attempt_count,
            format_due(*next_attempt_at, now)
        ),
        JobStatus::Running { attempt_count } => format!("running attempt {}", attempt_count + 1),
        JobStatus::Succeeded => "succeeded".to_string(),
        JobStatus::Failed { error_code, .. } => format!("failed ({error_code})"),
        JobStatus::Cancelled => "cancelled".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_engine::{ExistingJobPolicy, ManualClock, MemoryJobStore, SyncConfig, SyncQueue};
    use offsync_protocol::OperationKind;
    use std::sync::Arc;

    #[test]
    fn filters_by_entity_type() {
        let store = Arc::new(MemoryJobStore::new());
        let queue = SyncQueue::new(store.clone(), Arc::new(ManualClock::new(0)));
        queue.enqueue(
            &SyncConfig::new("Sale"),
            "s-1",
            OperationKind::Create,
            Vec::new(),
            ExistingJobPolicy::Keep,
        );
        queue.enqueue(
            &SyncConfig::new("Payment"),
            "p-1",
            OperationKind::Delete,
            Vec::new(),
            ExistingJobPolicy::Keep,
        );

        let all = collect(store.as_ref(), None).unwrap();
        assert_eq!(all.len(), 2);

        let payments = collect(store.as_ref(), Some("Payment")).unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].key, "sync_payment_p-1");
        assert_eq!(payments[0].operation, OperationKind::Delete);
    }

    #[test]
    fn status_descriptions() {
        let waiting = JobStatus::Enqueued {
            attempt_count: 2,
            next_attempt_at: 9_000,
        };
        assert_eq!(describe(&waiting, 5_000), "enqueued, 2 attempts, in 4s");
        assert_eq!(
            describe(&JobStatus::Running { attempt_count: 0 }, 0),
            "running attempt 1"
        );
    }
}
