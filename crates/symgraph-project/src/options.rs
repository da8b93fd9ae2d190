use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for one project.
///
/// The defaults mirror the daemon's stock behavior; embedders override
/// individual fields (tests usually drop the timer intervals to zero and
/// disable the threshold).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectOptions {
    /// Completed index results buffered before a sync is forced; 0 disables
    /// the threshold and leaves syncing to the timer.
    pub sync_threshold: usize,
    /// Idle time after the last job completion before a sync starts.
    pub sync_timeout: Duration,
    /// Coalescing window for watcher events.
    pub dirty_timeout: Duration,
    /// Retry interval for an `unload` that arrived during a sync.
    pub unload_retry: Duration,
    /// Keep at most one source row per file; competing compiles erase
    /// siblings with differing arguments.
    pub disallow_multiple_sources: bool,
    /// Disables filesystem watching entirely. Existing sources then
    /// suppress re-compiles; explicit check-reindex is required instead.
    pub no_file_system_watch: bool,
    /// Watch directories under system prefixes too.
    pub watch_system_paths: bool,
    /// Compatibility shim: retry unresolved USR references with the
    /// implicit-instance decoration `(im)` rewritten to `(py)`.
    pub objc_property_fallback: bool,
    /// Substring filter; submissions whose source path does not contain it
    /// are silently skipped.
    pub file_filter: Option<String>,
    /// Where to persist the file-id registry after each sync; `None` skips
    /// the save (tests, embedders that save elsewhere).
    pub file_ids_path: Option<PathBuf>,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self {
            sync_threshold: 0,
            sync_timeout: Duration::from_millis(500),
            dirty_timeout: Duration::from_millis(100),
            unload_retry: Duration::from_secs(1),
            disallow_multiple_sources: false,
            no_file_system_watch: false,
            watch_system_paths: false,
            objc_property_fallback: true,
            file_filter: None,
            file_ids_path: None,
        }
    }
}
