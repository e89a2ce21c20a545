//! Consumes debounced paths from the work channel and runs each through the
//! dispatch pipeline in [`state_machine`], `MaxParallelSends` at a time.

pub mod archive;
pub mod notification;
mod state_machine;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::config::EffectiveConfig;
use crate::core::CancellationToken;
use crate::diagnostics::Diagnostics;
use crate::resilience::ResilienceEngine;

/// Resolves the effective config for a path, or `None` if it matches no
/// configured (or no longer configured) watched folder.
pub type ConfigLookup = Arc<dyn Fn(&std::path::Path) -> Option<EffectiveConfig> + Send + Sync>;

/// Shared state handed to every worker task. Cloned cheaply (everything
/// inside is already `Arc`-backed or `Clone`).
pub struct SenderPool {
    pub diagnostics: Arc<Diagnostics>,
    pub resilience: Arc<ResilienceEngine>,
    pub http_client: reqwest::Client,
    pub resolve_config: ConfigLookup,
}

impl SenderPool {
    pub fn new(diagnostics: Arc<Diagnostics>, resilience: Arc<ResilienceEngine>, resolve_config: ConfigLookup) -> anyhow::Result<Arc<Self>> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Arc::new(Self {
            diagnostics,
            resilience,
            http_client,
            resolve_config,
        }))
    }

    /// Spawn `worker_count` tasks pulling from `rx` and run until `cancel`
    /// fires. Workers share one receiver behind a mutex; with `notify`-driven
    /// enqueue volumes this contention is negligible next to the HTTP round
    /// trip each item performs.
    pub async fn run(self: Arc<Self>, rx: mpsc::Receiver<PathBuf>, worker_count: usize, cancel: CancellationToken) {
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::with_capacity(worker_count.max(1));

        for _ in 0..worker_count.max(1) {
            let pool = Arc::clone(&self);
            let rx = Arc::clone(&rx);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = {
                        let mut guard = rx.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            item = guard.recv() => item,
                        }
                    };
                    let Some(path) = next else { return };
                    state_machine::run(path, &pool, &cancel).await;
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}
