//! CLI command implementations.

pub mod cancel;
pub mod inspect;
pub mod list;
pub mod show;

use offsync_engine::{FileJobStore, SyncResult};
use std::path::Path;

/// Opens an existing queue directory.
///
/// Fails with `Locked` while the app owning the queue is running.
pub fn open_store(path: &Path) -> SyncResult<FileJobStore> {
    FileJobStore::open(path, false)
}

/// Formats unix milliseconds relative to `now`, e.g. `in 4s` or `due`.
pub fn format_due(at_millis: u64, now_millis: u64) -> String {
    if at_millis <= now_millis {
        return "due".to_string();
    }
    let secs = (at_millis - now_millis).div_ceil(1000);
    match secs {
        0..=59 => format!("in {secs}s"),
        60..=3599 => format!("in {}m{}s", secs / 60, secs % 60),
        _ => format!("in {}h{}m", secs / 3600, (secs % 3600) / 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_formatting() {
        assert_eq!(format_due(1_000, 5_000), "due");
        assert_eq!(format_due(5_000, 5_000), "due");
        assert_eq!(format_due(5_001, 5_000), "in 1s");
        assert_eq!(format_due(95_000, 5_000), "in 1m30s");
        assert_eq!(format_due(5_000 + 7_260_000, 5_000), "in 2h1m");
    }
}
