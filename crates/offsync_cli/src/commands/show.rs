//! Show command implementation.

use super::format_due;
use offsync_engine::{Clock, Job, JobStore, SystemClock};
use std::path::Path;

/// Runs the show command for one job key.
pub fn run(path: &Path, key: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_store(path)?;
    let job = store
        .get(key)?
        .ok_or_else(|| format!("No job with key {key}"))?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        _ => {
            print_text_output(&job, SystemClock.now_millis());
        }
    }

    Ok(())
}

fn print_text_output(job: &Job, now: u64) {
    println!("Job {}", job.key);
    println!("  ID:           {}", job.id);
    println!("  Entity type:  {}", job.entity_type);
    println!("  Operation:    {}", job.input.operation_kind());
    println!("  State:        {:?}", job.state);
    println!("  Network:      {:?}", job.network);
    println!("  Attempts:     {}", job.attempt_count);
    println!("  Next attempt: {}", format_due(job.next_attempt_at, now));
    println!(
        "  Backoff:      {:?} doubling up to {:?}",
        job.backoff.initial_delay, job.backoff.max_delay
    );
    println!("  Input:");
    for (key, value) in job.input.as_map() {
        println!("    {key} = {value}");
    }
}
