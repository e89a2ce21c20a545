//! In-memory status and counters, with a read-only exposure surface.
//!
//! One [`Diagnostics`] instance is shared (via `Arc`) across the
//! WatcherManager, Debouncer, SenderPool, and ResilienceEngine for the
//! lifetime of the process; a config reload replaces the components that
//! feed it, not the instance itself, so counters accumulate across reloads.

pub mod metrics;
pub mod server;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use serde::Serialize;

const MAX_RECENT_EVENTS: usize = 1000;
const MAX_EVENTS_ENDPOINT_LIMIT: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct FileEventRecord {
    pub path: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshotEntry {
    pub failures: u32,
    pub open: bool,
    pub open_until_epoch_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub active_watchers: Vec<String>,
    pub restart_attempts: Vec<(String, u32)>,
    pub recent_events: Vec<FileEventRecord>,
    pub circuit_states: Vec<(String, CircuitSnapshotEntry)>,
    pub event_count: u64,
    pub timestamp: u64,
}

fn posted_key(path: &Path) -> String {
    let s = path.to_string_lossy();
    if cfg!(windows) {
        s.to_ascii_lowercase()
    } else {
        s.into_owned()
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct Diagnostics {
    events: Mutex<VecDeque<FileEventRecord>>,
    event_count: AtomicU64,
    posted: DashMap<String, bool>,
    watchers: DashSet<PathBuf>,
    restart_counts: DashMap<PathBuf, u32>,
    circuit_states: DashMap<String, CircuitSnapshotEntry>,

    file_processed_success_total: AtomicU64,
    file_processed_failure_total: AtomicU64,
    file_enqueued_total: AtomicU64,
    circuit_open_total: AtomicU64,
    http_attempts_total: AtomicU64,
    http_failures_total: AtomicU64,
    http_short_circuits_total: AtomicU64,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
            event_count: AtomicU64::new(0),
            posted: DashMap::new(),
            watchers: DashSet::new(),
            restart_counts: DashMap::new(),
            circuit_states: DashMap::new(),
            file_processed_success_total: AtomicU64::new(0),
            file_processed_failure_total: AtomicU64::new(0),
            file_enqueued_total: AtomicU64::new(0),
            circuit_open_total: AtomicU64::new(0),
            http_attempts_total: AtomicU64::new(0),
            http_failures_total: AtomicU64::new(0),
            http_short_circuits_total: AtomicU64::new(0),
        }
    }

    // -- file events / posted cache ----------------------------------------

    pub fn record_file_event(&self, path: &Path, success: bool, status_code: Option<u16>) {
        let record = FileEventRecord {
            path: path.to_string_lossy().into_owned(),
            success,
            status_code,
            timestamp: epoch_millis(),
        };

        {
            let mut events = self.events.lock();
            if events.len() >= MAX_RECENT_EVENTS {
                events.pop_front();
            }
            events.push_back(record);
        }
        self.event_count.fetch_add(1, Ordering::Relaxed);

        let posted = success && status_code == Some(200);
        self.posted.insert(posted_key(path), posted);

        if success {
            self.file_processed_success_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.file_processed_failure_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn is_posted(&self, path: &Path) -> bool {
        self.posted.get(&posted_key(path)).map(|v| *v).unwrap_or(false)
    }

    pub fn clear_posted(&self, path: &Path) {
        self.posted.remove(&posted_key(path));
    }

    // -- watchers -----------------------------------------------------------

    pub fn register_watcher(&self, folder: &Path) {
        self.watchers.insert(folder.to_path_buf());
    }

    pub fn unregister_watcher(&self, folder: &Path) {
        self.watchers.remove(folder);
        self.restart_counts.remove(folder);
    }

    pub fn active_watchers(&self) -> Vec<PathBuf> {
        self.watchers.iter().map(|e| e.key().clone()).collect()
    }

    // -- restart counters -----------------------------------------------------

    pub fn increment_restart(&self, folder: &Path) -> u32 {
        let mut entry = self.restart_counts.entry(folder.to_path_buf()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn reset_restart(&self, folder: &Path) {
        self.restart_counts.remove(folder);
    }

    // -- circuit state mirror ------------------------------------------------

    /// Mirror a circuit-breaker state for display. The authoritative
    /// enforcement state lives in `ResilienceEngine`'s own circuit map; this
    /// is a read-facing copy keyed identically by endpoint. Does not itself
    /// move `circuit_open_total` — call [`Self::record_circuit_opened`] at
    /// the moment of an actual closed-to-open transition.
    pub fn update_circuit_state(&self, endpoint_key: &str, failures: u32, open_until_epoch_ms: Option<u64>) {
        let open = open_until_epoch_ms.is_some_and(|t| t > epoch_millis());
        self.circuit_states.insert(
            endpoint_key.to_string(),
            CircuitSnapshotEntry {
                failures,
                open,
                open_until_epoch_ms,
            },
        );
    }

    /// Record a closed-to-open circuit transition (not every short-circuited
    /// call while already open).
    pub fn record_circuit_opened(&self) {
        self.circuit_open_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_short_circuit(&self) {
        self.http_short_circuits_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_attempt(&self) {
        self.http_attempts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_failure(&self) {
        self.http_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_enqueued(&self) {
        self.file_enqueued_total.fetch_add(1, Ordering::Relaxed);
    }

    // -- snapshot / counters -------------------------------------------------

    pub fn get_status(&self) -> StatusSnapshot {
        let recent_events: Vec<_> = {
            let events = self.events.lock();
            events.iter().rev().take(MAX_EVENTS_ENDPOINT_LIMIT).cloned().collect()
        };
        StatusSnapshot {
            active_watchers: self
                .watchers
                .iter()
                .map(|e| e.key().to_string_lossy().into_owned())
                .collect(),
            restart_attempts: self
                .restart_counts
                .iter()
                .map(|e| (e.key().to_string_lossy().into_owned(), *e.value()))
                .collect(),
            recent_events,
            circuit_states: self
                .circuit_states
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            event_count: self.event_count.load(Ordering::Relaxed),
            timestamp: epoch_millis(),
        }
    }

    pub fn recent_events(&self, limit: usize) -> Vec<FileEventRecord> {
        let events = self.events.lock();
        events.iter().rev().take(limit).cloned().collect()
    }

    pub fn counters(&self) -> Counters {
        Counters {
            file_processed_success_total: self.file_processed_success_total.load(Ordering::Relaxed),
            file_processed_failure_total: self.file_processed_failure_total.load(Ordering::Relaxed),
            file_enqueued_total: self.file_enqueued_total.load(Ordering::Relaxed),
            circuit_open_total: self.circuit_open_total.load(Ordering::Relaxed),
            http_attempts_total: self.http_attempts_total.load(Ordering::Relaxed),
            http_failures_total: self.http_failures_total.load(Ordering::Relaxed),
            http_short_circuits_total: self.http_short_circuits_total.load(Ordering::Relaxed),
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Counters {
    pub file_processed_success_total: u64,
    pub file_processed_failure_total: u64,
    pub file_enqueued_total: u64,
    pub circuit_open_total: u64,
    pub http_attempts_total: u64,
    pub http_failures_total: u64,
    pub http_short_circuits_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posting_200_marks_path_posted() {
        let diag = Diagnostics::new();
        let path = Path::new("/watch/a.txt");
        diag.record_file_event(path, true, Some(200));
        assert!(diag.is_posted(path));
    }

    #[test]
    fn failure_marks_path_not_posted() {
        let diag = Diagnostics::new();
        let path = Path::new("/watch/a.txt");
        diag.record_file_event(path, false, Some(500));
        assert!(!diag.is_posted(path));
    }

    #[test]
    fn success_with_non_200_does_not_mark_posted() {
        let diag = Diagnostics::new();
        let path = Path::new("/watch/a.txt");
        diag.record_file_event(path, true, Some(201));
        assert!(!diag.is_posted(path));
    }

    #[test]
    fn ring_buffer_evicts_oldest_beyond_capacity() {
        let diag = Diagnostics::new();
        for i in 0..(MAX_RECENT_EVENTS + 10) {
            diag.record_file_event(Path::new(&format!("/watch/{i}.txt")), true, Some(200));
        }
        let events = diag.events.lock();
        assert_eq!(events.len(), MAX_RECENT_EVENTS);
        assert_eq!(events.front().unwrap().path, "/watch/10.txt");
    }

    #[test]
    fn restart_counter_increments_and_resets() {
        let diag = Diagnostics::new();
        let folder = Path::new("/watch");
        assert_eq!(diag.increment_restart(folder), 1);
        assert_eq!(diag.increment_restart(folder), 2);
        diag.reset_restart(folder);
        assert_eq!(diag.increment_restart(folder), 1);
    }
}
