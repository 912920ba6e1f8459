//! Durable job records.
//!
//! The [`FileJobStore`] keeps one queue per directory:
//!
//! ```text
//! <queue_dir>/
//! ├─ LOCK           # Advisory lock, one process per queue
//! ├─ jobs.json      # All live jobs
//! └─ jobs.json.tmp  # Scratch file for atomic rewrites
//! ```

use crate::config::{Backoff, NetworkRequirement};
use crate::error::{SyncError, SyncResult};
use fs2::FileExt;
use offsync_protocol::JobInput;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const LOCK_FILE: &str = "LOCK";
const JOBS_FILE: &str = "jobs.json";
const JOBS_TEMP: &str = "jobs.json.tmp";
const FORMAT_VERSION: u32 = 1;

/// Scheduling state of a live job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for `next_attempt_at`.
    Enqueued,
    /// An attempt is in flight.
    Running,
}

/// A scheduled unit of sync work, one per unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Changes whenever the job is superseded.
    pub id: Uuid,
    /// Unique key, `{worker_name_prefix}_{entity_id}`.
    pub key: String,
    /// Entity type, used to find the handler.
    pub entity_type: String,
    /// Persisted input.
    pub input: JobInput,
    /// Network constraint.
    pub network: NetworkRequirement,
    /// Retry delays.
    pub backoff: Backoff,
    /// Attempts already finished.
    pub attempt_count: u32,
    /// Earliest time the next attempt may start (unix ms).
    pub next_attempt_at: u64,
    /// Scheduling state.
    pub state: JobState,
    /// When the job was (re)enqueued (unix ms).
    pub enqueued_at: u64,
}

impl Job {
    /// Returns true if the job may start at `now`.
    pub fn is_due(&self, now: u64) -> bool {
        self.state == JobState::Enqueued && self.next_attempt_at <= now
    }
}

/// Storage for live jobs, keyed by unique key.
///
/// Implementations only need per-call consistency; the queue serializes
/// read-modify-write sequences itself.
pub trait JobStore: Send + Sync {
    /// Returns the job stored under `key`.
    fn get(&self, key: &str) -> SyncResult<Option<Job>>;

    /// Inserts or overwrites a job.
    fn put(&self, job: Job) -> SyncResult<()>;

    /// Removes and returns the job stored under `key`.
    fn remove(&self, key: &str) -> SyncResult<Option<Job>>;

    /// Returns all jobs ordered by key.
    fn list(&self) -> SyncResult<Vec<Job>>;
}

/// Volatile store, for tests and hosts without persistence.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<BTreeMap<String, Job>>,
}

impl MemoryJobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn get(&self, key: &str) -> SyncResult<Option<Job>> {
        Ok(self.jobs.read().get(key).cloned())
    }

    fn put(&self, job: Job) -> SyncResult<()> {
        self.jobs.write().insert(job.key.clone(), job);
        Ok(())
    }

    fn remove(&self, key: &str) -> SyncResult<Option<Job>> {
        Ok(self.jobs.write().remove(key))
    }

    fn list(&self) -> SyncResult<Vec<Job>> {
        Ok(self.jobs.read().values().cloned().collect())
    }
}

#[derive(Serialize, Deserialize)]
struct JobsFile {
    version: u32,
    jobs: Vec<Job>,
}

/// Store that persists every change to a JSON file.
///
/// Holds an exclusive lock on the directory for its whole lifetime. The
/// whole job set is rewritten on each change (write temp, fsync, rename),
/// which suits the small queues of a device.
#[derive(Debug)]
pub struct FileJobStore {
    path: PathBuf,
    jobs: Mutex<BTreeMap<String, Job>>,
    /// Jobs reset from `Running` when the store was opened.
    recovered: usize,
    _lock_file: File,
}

impl FileJobStore {
    /// Opens the queue directory at `path`.
    ///
    /// Jobs left `Running` by a process that died mid-attempt are reset to
    /// `Enqueued` so they run again.
    ///
    /// # Errors
    ///
    /// - `Store` if the directory is missing and `create_if_missing` is false
    /// - `Locked` if another process holds the queue
    /// - `Io` or `Serialization` if the jobs file cannot be read
    pub fn open(path: &Path, create_if_missing: bool) -> SyncResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(SyncError::store(format!(
                    "queue directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(SyncError::store(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(SyncError::Locked);
        }

        let mut jobs = load_jobs(&path.join(JOBS_FILE))?;
        let mut recovered = 0usize;
        for job in jobs.values_mut() {
            if job.state == JobState::Running {
                job.state = JobState::Enqueued;
                recovered += 1;
            }
        }

        let store = Self {
            path: path.to_path_buf(),
            jobs: Mutex::new(BTreeMap::new()),
            recovered,
            _lock_file: lock_file,
        };
        if recovered > 0 {
            tracing::info!(recovered, path = %path.display(), "reset interrupted jobs");
            store.save(&jobs)?;
        }
        *store.jobs.lock() = jobs;
        Ok(store)
    }

    /// Returns how many interrupted jobs were reset when opening.
    pub fn recovered_count(&self) -> usize {
        self.recovered
    }

    /// Returns the queue directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, jobs: &BTreeMap<String, Job>) -> SyncResult<()> {
        let file = JobsFile {
            version: FORMAT_VERSION,
            jobs: jobs.values().cloned().collect(),
        };
        let data = serde_json::to_vec_pretty(&file)?;

        let temp_path = self.path.join(JOBS_TEMP);
        let mut temp = File::create(&temp_path)?;
        temp.write_all(&data)?;
        temp.sync_all()?;
        drop(temp);

        fs::rename(&temp_path, self.path.join(JOBS_FILE))?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> SyncResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> SyncResult<()> {
        Ok(())
    }

    /// Applies `change` to a copy of the job set, persists it, then swaps
    /// it in. The in-memory set is untouched if persisting fails.
    fn mutate<T>(&self, change: impl FnOnce(&mut BTreeMap<String, Job>) -> T) -> SyncResult<T> {
        let mut guard = self.jobs.lock();
        let mut next = guard.clone();
        let result = change(&mut next);
        self.save(&next)?;
        *guard = next;
        Ok(result)
    }
}

fn load_jobs(path: &Path) -> SyncResult<BTreeMap<String, Job>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;
    if data.is_empty() {
        return Ok(BTreeMap::new());
    }

    let file: JobsFile = serde_json::from_slice(&data)?;
    if file.version != FORMAT_VERSION {
        return Err(SyncError::store(format!(
            "unsupported jobs file version {}",
            file.version
        )));
    }
    Ok(file
        .jobs
        .into_iter()
        .map(|job| (job.key.clone(), job))
        .collect())
}

impl JobStore for FileJobStore {
    fn get(&self, key: &str) -> SyncResult<Option<Job>> {
        Ok(self.jobs.lock().get(key).cloned())
    }

    fn put(&self, job: Job) -> SyncResult<()> {
        self.mutate(|jobs| {
            jobs.insert(job.key.clone(), job);
        })
    }

    fn remove(&self, key: &str) -> SyncResult<Option<Job>> {
        if !self.jobs.lock().contains_key(key) {
            return Ok(None);
        }
        self.mutate(|jobs| jobs.remove(key))
    }

    fn list(&self) -> SyncResult<Vec<Job>> {
        Ok(self.jobs.lock().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_protocol::OperationKind;
    use std::time::Duration;
    use tempfile::tempdir;

    fn job(key: &str, state: JobState) -> Job {
        Job {
            id: Uuid::new_v4(),
            key: key.to_string(),
            entity_type: "Sale".to_string(),
            input: JobInput::new("s-1", OperationKind::Update, Vec::new()).unwrap(),
            network: NetworkRequirement::Connected,
            backoff: Backoff::new(Duration::from_secs(30), Duration::from_secs(900)),
            attempt_count: 0,
            next_attempt_at: 1_000,
            state,
            enqueued_at: 1_000,
        }
    }

    #[test]
    fn memory_store_crud() {
        let store = MemoryJobStore::new();
        store.put(job("sync_sale_b", JobState::Enqueued)).unwrap();
        store.put(job("sync_sale_a", JobState::Enqueued)).unwrap();

        let keys: Vec<_> = store.list().unwrap().into_iter().map(|j| j.key).collect();
        assert_eq!(keys, vec!["sync_sale_a", "sync_sale_b"]);

        assert!(store.remove("sync_sale_a").unwrap().is_some());
        assert!(store.remove("sync_sale_a").unwrap().is_none());
        assert!(store.get("sync_sale_a").unwrap().is_none());
    }

    #[test]
    fn due_only_when_enqueued_and_time_reached() {
        let mut j = job("k", JobState::Enqueued);
        assert!(!j.is_due(999));
        assert!(j.is_due(1_000));
        j.state = JobState::Running;
        assert!(!j.is_due(5_000));
    }

    #[test]
    fn file_store_survives_reopen() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("queue");
        let original = job("sync_sale_s-1", JobState::Enqueued);

        {
            let store = FileJobStore::open(&path, true).unwrap();
            store.put(original.clone()).unwrap();
        }

        let store = FileJobStore::open(&path, false).unwrap();
        assert_eq!(store.get("sync_sale_s-1").unwrap(), Some(original));
        assert!(!path.join(JOBS_TEMP).exists());
    }

    #[test]
    fn reopen_resets_running_jobs() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("queue");

        {
            let store = FileJobStore::open(&path, true).unwrap();
            store.put(job("sync_sale_s-1", JobState::Running)).unwrap();
        }

        let store = FileJobStore::open(&path, false).unwrap();
        let job = store.get("sync_sale_s-1").unwrap().unwrap();
        assert_eq!(job.state, JobState::Enqueued);
        assert_eq!(store.recovered_count(), 1);
        drop(store);

        let store = FileJobStore::open(&path, false).unwrap();
        assert_eq!(store.recovered_count(), 0);
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("queue");

        let _first = FileJobStore::open(&path, true).unwrap();
        let second = FileJobStore::open(&path, true);
        assert!(matches!(second, Err(SyncError::Locked)));
    }

    #[test]
    fn open_fails_if_missing_and_no_create() {
        let temp = tempdir().unwrap();
        let result = FileJobStore::open(&temp.path().join("nope"), false);
        assert!(matches!(result, Err(SyncError::Store(_))));
    }

    #[test]
    fn remove_persists() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("queue");

        {
            let store = FileJobStore::open(&path, true).unwrap();
            store.put(job("a", JobState::Enqueued)).unwrap();
            store.put(job("b", JobState::Enqueued)).unwrap();
            store.remove("a").unwrap();
        }

        let store = FileJobStore::open(&path, false).unwrap();
        let keys: Vec<_> = store.list().unwrap().into_iter().map(|j| j.key).collect();
        assert_eq!(keys, vec!["b"]);
    }
}
