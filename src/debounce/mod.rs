//! Collapses bursts of events per path into at most one emission per
//! debounce window.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::core::CancellationToken;
use crate::diagnostics::Diagnostics;

const SWEEP_INTERVAL: Duration = Duration::from_millis(100);
const BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(1);

/// Resolves the effective debounce window (milliseconds) for a path, e.g.
/// by looking up the folder it belongs to. Falls back to the global default
/// when the path matches no configured folder.
pub type DebounceLookup = Arc<dyn Fn(&std::path::Path) -> u64 + Send + Sync>;

/// Accepts scheduled paths, collapses repeats inside a window, and emits
/// ready paths to the work channel consumed by the sender pool.
pub struct Debouncer {
    pending: DashMap<PathBuf, Instant>,
    tx: mpsc::Sender<PathBuf>,
    diagnostics: Arc<Diagnostics>,
    debounce_ms: DebounceLookup,
}

impl Debouncer {
    pub fn new(tx: mpsc::Sender<PathBuf>, diagnostics: Arc<Diagnostics>, debounce_ms: DebounceLookup) -> Self {
        Self {
            pending: DashMap::new(),
            tx,
            diagnostics,
            debounce_ms,
        }
    }

    /// Record/refresh `path`'s last-seen timestamp. No event is emitted
    /// here except for the `debounceMs <= 0` fast path, which attempts a
    /// single non-blocking write immediately.
    pub fn schedule(&self, path: PathBuf) {
        let window_ms = (self.debounce_ms)(&path);
        if window_ms == 0 {
            self.pending.remove(&path);
            if self.tx.try_send(path.clone()).is_ok() {
                self.diagnostics.increment_enqueued();
                return;
            }
            // Channel was full; fall through and let the periodic sweep
            // retry with the blocking-with-timeout policy.
        }
        self.pending.insert(path, Instant::now());
    }

    /// Run the periodic scheduler until cancelled. One instance should run
    /// for the lifetime of the process; it is safe to call concurrently
    /// with [`Self::schedule`] from any number of callers.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
            }
            self.sweep(&cancel).await;
        }
    }

    async fn sweep(&self, cancel: &CancellationToken) {
        let now = Instant::now();
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|e| now.duration_since(*e.value()) >= Duration::from_millis((self.debounce_ms)(e.key())))
            .map(|e| e.key().clone())
            .collect();

        for path in ready {
            self.pending.remove(&path);
            self.emit(path, cancel).await;
        }
    }

    async fn emit(&self, path: PathBuf, cancel: &CancellationToken) {
        if self.tx.try_send(path.clone()).is_ok() {
            self.diagnostics.increment_enqueued();
            return;
        }

        let send = tokio::time::timeout(BACKPRESSURE_TIMEOUT, self.tx.send(path.clone()));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            result = send => match result {
                Ok(Ok(())) => self.diagnostics.increment_enqueued(),
                _ => {
                    crate::log!("debounce"; "dropping {} under sustained backpressure", path.display());
                    self.diagnostics.record_file_event(&path, false, None);
                }
            },
        }
    }

    /// Number of paths currently awaiting their debounce window.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_debounce(ms: u64) -> DebounceLookup {
        Arc::new(move |_| ms)
    }

    #[tokio::test]
    async fn zero_debounce_emits_immediately_without_tracking() {
        let (tx, mut rx) = mpsc::channel(8);
        let debouncer = Debouncer::new(tx, Arc::new(Diagnostics::new()), fixed_debounce(0));
        debouncer.schedule(PathBuf::from("/watch/a.txt"));

        assert_eq!(debouncer.pending_count(), 0);
        let received = rx.recv().await.unwrap();
        assert_eq!(received, PathBuf::from("/watch/a.txt"));
    }

    #[tokio::test]
    async fn repeated_schedule_within_window_produces_one_emission() {
        let (tx, mut rx) = mpsc::channel(8);
        let diagnostics = Arc::new(Diagnostics::new());
        let debouncer = Debouncer::new(tx, diagnostics, fixed_debounce(50));
        let cancel = crate::core::cancellation_token();

        debouncer.schedule(PathBuf::from("/watch/a.txt"));
        debouncer.schedule(PathBuf::from("/watch/a.txt"));
        assert_eq!(debouncer.pending_count(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        debouncer.sweep(&cancel).await;

        let received = rx.try_recv().unwrap();
        assert_eq!(received, PathBuf::from("/watch/a.txt"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn entries_inside_window_are_not_yet_emitted() {
        let (tx, mut rx) = mpsc::channel(8);
        let debouncer = Debouncer::new(tx, Arc::new(Diagnostics::new()), fixed_debounce(10_000));
        let cancel = crate::core::cancellation_token();

        debouncer.schedule(PathBuf::from("/watch/a.txt"));
        debouncer.sweep(&cancel).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(debouncer.pending_count(), 1);
    }
}
