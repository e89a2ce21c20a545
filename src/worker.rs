//! Orchestrator: owns the lifecycle of every other component and the
//! config-reload sequence.
//!
//! Data flow: OS event -> WatcherManager -> `Worker::on_file_event` (filter)
//! -> Debouncer -> work channel -> dispatch (RestPost goes to the
//! SenderPool, ExternalProcess runs directly) -> Diagnostics.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, watch};

use crate::actions;
use crate::config::{self, EffectiveConfig, GlobalConfig, ResolvedAction, WatchedFolder};
use crate::core::{self, CancellationToken};
use crate::debounce::{DebounceLookup, Debouncer};
use crate::diagnostics::{self, Diagnostics};
use crate::resilience::ResilienceEngine;
use crate::sender::{ConfigLookup, SenderPool};
use crate::watcher::{ChangeKind, FileEvent, WatcherManager};

type FolderMap = Arc<RwLock<FxHashMap<PathBuf, EffectiveConfig>>>;

pub struct Worker {
    diagnostics: Arc<Diagnostics>,
    watcher: Arc<WatcherManager>,
    folders: FolderMap,
    debouncer: Arc<Debouncer>,
    diagnostics_server: Mutex<Option<(String, watch::Sender<bool>)>>,
}

impl Worker {
    /// Run the service until `cancel` fires: start components from the
    /// current config, then react to config reloads until shutdown.
    pub async fn run(diagnostics: Arc<Diagnostics>, cancel: CancellationToken) -> anyhow::Result<()> {
        let resilience = Arc::new(ResilienceEngine::new(Arc::clone(&diagnostics)));
        let watcher = Arc::new(WatcherManager::new(Arc::clone(&diagnostics)));
        let folders: FolderMap = Arc::new(RwLock::new(FxHashMap::default()));

        let initial = config::cfg();
        let (ready_tx, mut ready_rx) = mpsc::channel::<PathBuf>(initial.channel_capacity);
        let (sender_tx, sender_rx) = mpsc::channel::<PathBuf>(initial.channel_capacity);

        let resolver = watcher.resolver();
        let debounce_lookup: DebounceLookup = {
            let resolver = Arc::clone(&resolver);
            let folders = Arc::clone(&folders);
            Arc::new(move |path: &Path| {
                resolver
                    .try_resolve(path)
                    .and_then(|folder| folders.read().get(&folder).map(|e| e.debounce_ms))
                    .unwrap_or(300)
            })
        };
        let debouncer = Arc::new(Debouncer::new(ready_tx, Arc::clone(&diagnostics), debounce_lookup));

        let config_lookup: ConfigLookup = {
            let resolver = Arc::clone(&resolver);
            let folders = Arc::clone(&folders);
            Arc::new(move |path: &Path| {
                let folder = resolver.try_resolve(path)?;
                folders.read().get(&folder).cloned()
            })
        };
        let sender_pool = SenderPool::new(Arc::clone(&diagnostics), Arc::clone(&resilience), config_lookup)?;

        let worker = Arc::new(Self {
            diagnostics: Arc::clone(&diagnostics),
            watcher: Arc::clone(&watcher),
            folders,
            debouncer: Arc::clone(&debouncer),
            diagnostics_server: Mutex::new(None),
        });

        apply_config(&worker, &initial, &cancel);

        let sender_task = tokio::spawn(Arc::clone(&sender_pool).run(sender_rx, initial.max_parallel_sends, cancel.clone()));
        let debounce_task = tokio::spawn({
            let debouncer = Arc::clone(&debouncer);
            let cancel = cancel.clone();
            async move { debouncer.run(cancel).await }
        });

        let dispatch_task = tokio::spawn({
            let worker = Arc::clone(&worker);
            let sender_tx = sender_tx.clone();
            let cancel = cancel.clone();
            async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        maybe_path = ready_rx.recv() => {
                            match maybe_path {
                                Some(path) => worker.dispatch(path, &sender_tx).await,
                                None => return,
                            }
                        }
                    }
                }
            }
        });

        let mut config_changes = config::subscribe();
        let mut reload_poll = tokio::time::interval(Duration::from_millis(200));
        reload_poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = config_changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    crate::log!("config"; "reload detected, restarting watchers");
                    worker.watcher.stop_all();
                    apply_config(&worker, &config::cfg(), &cancel);
                }
                _ = reload_poll.tick() => {
                    match config::reload_config() {
                        Ok(true) => crate::log!("config"; "config file changed on disk, reloading"),
                        Ok(false) => {}
                        Err(e) => crate::log!("error"; "config reload failed, keeping previous snapshot: {e}"),
                    }
                }
            }
        }

        worker.watcher.stop_all();
        if let Some((_, tx)) = worker.diagnostics_server.lock().take() {
            let _ = tx.send(true);
        }
        drop(sender_tx);
        let _ = tokio::join!(sender_task, debounce_task, dispatch_task);
        Ok(())
    }

    /// Filter pipeline invoked for every raw watcher event (and for files
    /// discovered by the startup rescan).
    fn on_file_event(&self, event: FileEvent) {
        let Some(folder) = self.watcher.try_resolve(&event.path) else {
            return;
        };
        let effective = self.folders.read().get(&folder).cloned();
        let Some(effective) = effective else {
            return;
        };

        if in_processed_folder(&event.path, &folder, &effective.processed_folder) {
            return;
        }

        let Some(filename) = event.path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return;
        };

        if !extension_allowed(&filename, &effective.allowed_extensions) {
            return;
        }
        if crate::pattern::try_match_any(&filename, &effective.exclude_patterns).is_some() {
            return;
        }

        // A genuine rewrite makes a previously-posted path eligible again;
        // a duplicate notification for an already-handled path is dropped.
        if event.kind == ChangeKind::Changed {
            self.diagnostics.clear_posted(&event.path);
        }
        if self.diagnostics.is_posted(&event.path) {
            return;
        }

        self.debouncer.schedule(event.path);
    }

    async fn dispatch(&self, path: PathBuf, sender_tx: &mpsc::Sender<PathBuf>) {
        let Some(folder) = self.watcher.try_resolve(&path) else {
            return;
        };
        let effective = self.folders.read().get(&folder).cloned();
        let Some(effective) = effective else {
            return;
        };

        match effective.action {
            Some(ResolvedAction::ExternalProcess(cfg)) => {
                tokio::spawn(async move {
                    if let Err(e) = actions::run_external_process(&cfg, &path).await {
                        crate::log!("action"; "{e}");
                    }
                });
            }
            Some(ResolvedAction::RestPost(_)) => {
                if sender_tx.send(path).await.is_err() {
                    crate::log!("send"; "sender channel closed, dropping file");
                }
            }
            None => {}
        }
    }
}

fn in_processed_folder(path: &Path, folder: &Path, processed_folder: &str) -> bool {
    path.strip_prefix(folder)
        .ok()
        .into_iter()
        .flat_map(|rel| rel.components())
        .any(|c| c.as_os_str().to_string_lossy().eq_ignore_ascii_case(processed_folder))
}

fn extension_allowed(filename: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    allowed.iter().any(|pattern| {
        if crate::pattern::contains_wildcards(pattern) {
            crate::pattern::is_match(filename, pattern)
        } else {
            filename.to_ascii_lowercase().ends_with(&pattern.to_ascii_lowercase())
        }
    })
}

/// Rebuild the folder->config map, (re)start watchers, rescan existing
/// files, and (re)start the diagnostics server if its address changed.
fn apply_config(worker: &Arc<Worker>, global: &GlobalConfig, cancel: &CancellationToken) {
    let resolved = crate::watcher::configure_folder_actions(&global.folders, global);
    {
        let mut map = worker.folders.write();
        map.clear();
        map.extend(resolved.iter().cloned());
    }

    crate::logger::set_verbose(global.logging.verbose);

    if global.folders.is_empty() {
        crate::log!("watch"; "no folders configured; idle until next reload");
    } else {
        let on_changed = {
            let worker = Arc::clone(worker);
            move |event: FileEvent| worker.on_file_event(event)
        };
        let on_exhausted = move |folder: PathBuf| {
            crate::log!("watch"; "{} permanently stopped after exhausting restarts", folder.display());
        };
        worker.watcher.start(&global.folders, global, cancel.clone(), on_changed, on_exhausted);
        rescan_existing(worker, &global.folders, global);
    }

    apply_diagnostics_server(worker, global, cancel);
}

/// Walk each watched folder once at startup (or after a reload that adds a
/// folder) so files already present are not skipped until they next change.
fn rescan_existing(worker: &Arc<Worker>, folders: &[WatchedFolder], global: &GlobalConfig) {
    for wf in folders {
        let action = wf.action.as_ref().and_then(|name| global.actions.get(name));
        let effective = EffectiveConfig::resolve(global, wf.path.clone(), action);
        let mut found = Vec::new();
        walk(&wf.path, effective.include_subdirectories, &mut found);
        for path in found {
            worker.on_file_event(FileEvent {
                path,
                kind: ChangeKind::Created,
                old_path: None,
            });
        }
    }
}

fn walk(dir: &Path, recurse: bool, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else { continue };
        if file_type.is_dir() {
            if recurse {
                walk(&path, recurse, out);
            }
        } else if file_type.is_file() {
            out.push(path);
        }
    }
}

fn apply_diagnostics_server(worker: &Arc<Worker>, global: &GlobalConfig, cancel: &CancellationToken) {
    let Some(prefix) = global.diagnostics.url_prefix.clone() else {
        if let Some((_, tx)) = worker.diagnostics_server.lock().take() {
            let _ = tx.send(true);
        }
        return;
    };

    {
        let guard = worker.diagnostics_server.lock();
        if guard.as_ref().is_some_and(|(current, _)| *current == prefix) {
            return;
        }
    }

    if let Some((_, tx)) = worker.diagnostics_server.lock().take() {
        let _ = tx.send(true);
    }

    let (manual_tx, manual_rx) = core::manual_cancellation();
    let process_cancel = cancel.clone();
    let diag = Arc::clone(&worker.diagnostics);
    let bearer_token = global.diagnostics.bearer_token.clone();
    let prefix_for_bind = prefix.clone();

    tokio::task::spawn_blocking(move || {
        let server = match diagnostics::server::bind(&prefix_for_bind) {
            Ok(server) => server,
            Err(e) => {
                crate::log!("diagnostics"; "failed to bind {prefix_for_bind}: {e}");
                return;
            }
        };
        server.run(diag, bearer_token, manual_rx);
    });

    tokio::spawn({
        let manual_tx = manual_tx.clone();
        async move {
            process_cancel.cancelled().await;
            let _ = manual_tx.send(true);
        }
    });

    *worker.diagnostics_server.lock() = Some((prefix, manual_tx));
}
