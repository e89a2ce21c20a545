//! Process-wide shutdown signaling.
//!
//! A single `ctrlc`/SIGTERM handler flips a global flag and a `tokio::sync::watch`
//! channel that every suspension point in the pipeline (debounce sleep, channel
//! recv, HTTP send, backoff sleep, watcher restart delay) can race against via
//! [`CancellationToken::cancelled`].

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);
static SHUTDOWN_TX: OnceLock<watch::Sender<bool>> = OnceLock::new();

/// A cheaply-cloneable handle that suspension points can select on to
/// observe process shutdown.
#[derive(Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Resolves once shutdown has been requested. Safe to call repeatedly
    /// and from multiple clones concurrently.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Obtain a handle to the process-wide cancellation signal.
///
/// Safe to call before [`setup_shutdown_handler`]; the channel is created
/// lazily and starts in the non-cancelled state.
pub fn cancellation_token() -> CancellationToken {
    let tx = SHUTDOWN_TX.get_or_init(|| watch::channel(false).0);
    CancellationToken {
        rx: tx.subscribe(),
    }
}

/// Create an independent cancellation channel, for components that need to
/// be torn down on their own schedule rather than only at process shutdown
/// (e.g. restarting the diagnostics server when its bind address changes).
pub fn manual_cancellation() -> (watch::Sender<bool>, CancellationToken) {
    let (tx, rx) = watch::channel(false);
    (tx, CancellationToken { rx })
}

/// Install the process-wide Ctrl+C / SIGTERM handler. Call once at startup,
/// before any component that checks [`is_shutdown`] or holds a
/// [`CancellationToken`] begins work.
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    let tx = SHUTDOWN_TX.get_or_init(|| watch::channel(false).0).clone();
    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::SeqCst);
        let _ = tx.send(true);
        crate::log!("shutdown"; "signal received, stopping...");
    })
    .map_err(|e| anyhow::anyhow!("failed to install shutdown handler: {e}"))
}

/// Check whether shutdown has been requested. Uses `Relaxed` ordering:
/// worst case is processing a few more items before the cancellation token
/// propagates, which is acceptable for this service.
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_resolves_after_send() {
        let tx = watch::channel(false).0;
        let rx = tx.subscribe();
        let token = CancellationToken { rx };
        assert!(!token.is_cancelled());
        tx.send(true).unwrap();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn token_returns_immediately_when_already_cancelled() {
        let tx = watch::channel(true).0;
        let rx = tx.subscribe();
        let token = CancellationToken { rx };
        // Should not hang.
        token.cancelled().await;
    }
}
