//! Shared fs-event types produced by a [`super::WatcherManager`].

use std::path::PathBuf;

/// Only the change kinds the Orchestrator cares about; `Deleted` is
/// suppressed upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Changed,
    Renamed,
}

/// A normalized filesystem change, ready for the filter pipeline.
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub old_path: Option<PathBuf>,
}

/// Lifecycle state of a single folder's watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Running,
    Faulted,
    Restarting,
    Exhausted,
}
