//! Global configuration: JSON document shape, validation, and the
//! per-path effective-config merge.
//!
//! # Module structure
//!
//! ```text
//! config/
//! ├── action.rs      # ActionDef (RestPost | ExternalProcess) and their fields
//! ├── effective.rs    # EffectiveConfig: the per-path merged, non-optional view
//! ├── types/
//! │   ├── error.rs    # ConfigError, ConfigDiagnostics
//! │   └── handle.rs   # Global arc-swap handle + hot reload
//! └── mod.rs          # GlobalConfig (this file)
//! ```

pub mod action;
pub mod effective;
pub mod path;
pub mod types;

pub use action::{ActionDef, ExternalProcessConfig, RestPostConfig};
pub use effective::{EffectiveConfig, ResolvedAction, ResolvedRestPost};
pub use types::{ConfigDiagnostics, ConfigError, cfg, init_config, reload_config, subscribe};

use crate::logger::sink::LogFormat;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A single watched directory and the action it feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedFolder {
    pub path: PathBuf,
    pub action: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherTuning {
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    #[serde(default = "default_internal_buffer_bytes")]
    pub internal_buffer_bytes: usize,
}

fn default_max_restart_attempts() -> u32 {
    5
}
fn default_restart_delay_ms() -> u64 {
    2000
}
fn default_internal_buffer_bytes() -> usize {
    4096
}

impl Default for WatcherTuning {
    fn default() -> Self {
        Self {
            max_restart_attempts: default_max_restart_attempts(),
            restart_delay_ms: default_restart_delay_ms(),
            internal_buffer_bytes: default_internal_buffer_bytes(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    pub url_prefix: Option<String>,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub file_path: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub verbose: bool,
}

fn default_log_format() -> LogFormat {
    LogFormat::Csv
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_path: None,
            format: default_log_format(),
            verbose: false,
        }
    }
}

/// Root configuration document (`FileWatchRest.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub folders: Vec<WatchedFolder>,
    #[serde(default)]
    pub actions: FxHashMap<String, ActionDef>,
    /// Defaults for every optional `RestPost` field, inherited by any
    /// action (or watched folder with no action) that leaves a field `null`.
    #[serde(default)]
    pub defaults: RestPostConfig,
    #[serde(default)]
    pub watcher: WatcherTuning,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_max_parallel_sends")]
    pub max_parallel_sends: usize,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Absolute path this document was loaded from (internal; not serialized
    /// back out when the document is freshly constructed).
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_channel_capacity() -> usize {
    1024
}
fn default_max_parallel_sends() -> usize {
    4
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            actions: FxHashMap::default(),
            defaults: RestPostConfig::default(),
            watcher: WatcherTuning::default(),
            channel_capacity: default_channel_capacity(),
            max_parallel_sends: default_max_parallel_sends(),
            diagnostics: DiagnosticsConfig::default(),
            logging: LoggingConfig::default(),
            config_path: PathBuf::new(),
        }
    }
}

impl GlobalConfig {
    /// Load, normalize, and validate a config document from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_str(&content, path)
    }

    /// Parse, normalize, and validate an already-read document. Exposed
    /// separately from [`Self::load`] so the hot-reload path can hash the
    /// raw content without reading the file twice.
    pub fn from_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: GlobalConfig = serde_json::from_str(content)?;
        config.config_path = path.to_path_buf();
        config.normalize();
        config.validate()?.into_result()?;
        Ok(config)
    }

    /// Resolve every folder path to an absolute form relative to the
    /// config file's directory.
    pub(crate) fn normalize(&mut self) {
        let base = self
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        for folder in &mut self.folders {
            if folder.path.is_relative() {
                folder.path = base.join(&folder.path);
            }
        }
    }

    /// Validate the document, collecting every problem rather than failing
    /// fast on the first one.
    pub fn validate(&self) -> Result<ConfigDiagnostics, ConfigError> {
        let mut diag = ConfigDiagnostics::new();

        for (i, folder) in self.folders.iter().enumerate() {
            if let Some(action_name) = &folder.action
                && !self.actions.contains_key(action_name)
            {
                diag.error(
                    format!("folders[{i}].action"),
                    format!("references unknown action `{action_name}`"),
                );
            }
        }

        for (name, action) in &self.actions {
            validate_action(name, action, &self.defaults, &mut diag);
        }

        if let Some(endpoint) = &self.defaults.endpoint {
            validate_endpoint("defaults.endpoint", endpoint, &mut diag);
        }
        if let Some(extensions) = &self.defaults.allowed_extensions {
            validate_extensions("defaults.allowed_extensions", extensions, &mut diag);
        }

        Ok(diag)
    }

    /// A clone with every bearer token blanked out, safe to hand to a caller
    /// that hasn't authenticated. The diagnostics server's `/config` route is
    /// unauthenticated by design, but that doesn't extend to the credentials
    /// the document carries for talking to upstream endpoints or to the
    /// diagnostics server itself.
    pub fn redacted(&self) -> Self {
        let mut redacted = self.clone();
        redacted.defaults.bearer_token = None;
        redacted.diagnostics.bearer_token = None;
        for action in redacted.actions.values_mut() {
            if let ActionDef::RestPost(rp) = action {
                rp.bearer_token = None;
            }
        }
        redacted
    }
}

fn validate_action(
    name: &str,
    action: &ActionDef,
    defaults: &RestPostConfig,
    diag: &mut ConfigDiagnostics,
) {
    match action {
        ActionDef::RestPost(rp) => {
            let endpoint = rp.endpoint.as_ref().or(defaults.endpoint.as_ref());
            match endpoint {
                Some(endpoint) => validate_endpoint(&format!("actions.{name}.endpoint"), endpoint, diag),
                None => diag.error(
                    format!("actions.{name}.endpoint"),
                    "no endpoint set on the action or in defaults",
                ),
            }
            if let Some(extensions) = &rp.allowed_extensions {
                validate_extensions(&format!("actions.{name}.allowed_extensions"), extensions, diag);
            }
        }
        ActionDef::ExternalProcess(ep) => {
            if ep.executable.trim().is_empty() {
                diag.error(format!("actions.{name}.executable"), "must not be empty");
            }
            if let Some(extensions) = &ep.allowed_extensions {
                validate_extensions(&format!("actions.{name}.allowed_extensions"), extensions, diag);
            }
        }
    }
}

fn validate_endpoint(field: &str, endpoint: &str, diag: &mut ConfigDiagnostics) {
    match url::Url::parse(endpoint) {
        Ok(url) if (url.scheme() == "http" || url.scheme() == "https") && url.host().is_some() => {}
        _ => diag.error(field, format!("`{endpoint}` is not a valid absolute http(s) URI")),
    }
}

fn validate_extensions(field: &str, extensions: &[String], diag: &mut ConfigDiagnostics) {
    for ext in extensions {
        if !ext.starts_with('.') && !crate::pattern::contains_wildcards(ext) {
            diag.error(
                field,
                format!("`{ext}` must start with `.` or be a glob pattern"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("FileWatchRest.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_minimal_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"{
                "folders": [{"path": "watched", "action": "hook"}],
                "actions": {
                    "hook": {"kind": "RestPost", "endpoint": "https://example.com/hook"}
                }
            }"#,
        );
        let config = GlobalConfig::load(&path).unwrap();
        assert_eq!(config.folders.len(), 1);
        assert!(config.folders[0].path.is_absolute());
    }

    #[test]
    fn rejects_unknown_action_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"{"folders": [{"path": "watched", "action": "missing"}], "actions": {}}"#,
        );
        let err = GlobalConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_invalid_endpoint_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"{
                "folders": [],
                "actions": {"hook": {"kind": "RestPost", "endpoint": "not-a-url"}}
            }"#,
        );
        let err = GlobalConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_allowed_extension_without_dot_or_wildcard() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"{
                "folders": [],
                "actions": {
                    "hook": {
                        "kind": "RestPost",
                        "endpoint": "https://example.com/hook",
                        "allowed_extensions": ["txt"]
                    }
                }
            }"#,
        );
        let err = GlobalConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
