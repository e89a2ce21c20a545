//! Per-folder watcher lifecycle bookkeeping.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use super::types::WatcherState;

/// Tracks one configured folder's watcher lifecycle:
/// `Idle -> Running -> Faulted -> Restarting -> Running` or `-> Exhausted`.
pub struct WatcherEntry {
    pub folder: PathBuf,
    state: Mutex<WatcherState>,
    restart_count: AtomicU32,
}

impl WatcherEntry {
    pub fn new(folder: PathBuf) -> Self {
        Self {
            folder,
            state: Mutex::new(WatcherState::Idle),
            restart_count: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> WatcherState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: WatcherState) {
        *self.state.lock() = state;
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count.load(Ordering::Relaxed)
    }

    pub fn increment_restart(&self) -> u32 {
        self.restart_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn reset_restart(&self) {
        self.restart_count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_and_tracks_restart_count() {
        let entry = WatcherEntry::new(PathBuf::from("/watch"));
        assert_eq!(entry.state(), WatcherState::Idle);
        assert_eq!(entry.increment_restart(), 1);
        assert_eq!(entry.increment_restart(), 2);
        entry.reset_restart();
        assert_eq!(entry.restart_count(), 0);
    }
}
