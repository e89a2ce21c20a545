//! Fully resolved, non-optional per-path configuration view.

use std::path::PathBuf;

use super::GlobalConfig;
use super::action::{ActionDef, ExternalProcessConfig, RestPostConfig};

/// The merged, non-optional view of global defaults and the action
/// referenced by the longest-matching watched folder.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub folder: PathBuf,
    pub allowed_extensions: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub include_subdirectories: bool,
    pub debounce_ms: u64,
    pub wait_for_file_ready_ms: u64,
    pub discard_zero_byte_files: bool,
    pub processed_folder: String,
    pub move_processed_files: bool,
    pub action: Option<ResolvedAction>,
}

#[derive(Debug, Clone)]
pub enum ResolvedAction {
    RestPost(ResolvedRestPost),
    ExternalProcess(ExternalProcessConfig),
}

#[derive(Debug, Clone)]
pub struct ResolvedRestPost {
    pub endpoint: String,
    pub bearer_token: Option<String>,
    pub post_file_contents: bool,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub max_content_bytes: u64,
    pub streaming_threshold_bytes: u64,
    pub enable_circuit_breaker: bool,
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_open_duration_ms: u64,
}

impl EffectiveConfig {
    /// Merge `global`'s defaults with the action (if any) attached to
    /// `folder`, producing the fully resolved view used for every decision
    /// made about paths under that folder.
    pub fn resolve(global: &GlobalConfig, folder: PathBuf, action: Option<&ActionDef>) -> Self {
        match action {
            Some(ActionDef::RestPost(rp)) => Self::from_rest_post(global, folder, rp),
            Some(ActionDef::ExternalProcess(ep)) => Self::from_external_process(global, folder, ep),
            None => Self::from_rest_post(global, folder, &RestPostConfig::default()),
        }
    }

    fn from_rest_post(global: &GlobalConfig, folder: PathBuf, rp: &RestPostConfig) -> Self {
        let d = &global.defaults;
        let merged = RestPostConfig {
            endpoint: rp.endpoint.clone().or_else(|| d.endpoint.clone()),
            bearer_token: rp.bearer_token.clone().or_else(|| d.bearer_token.clone()),
            post_file_contents: rp.post_file_contents.or(d.post_file_contents),
            processed_folder: rp.processed_folder.clone().or_else(|| d.processed_folder.clone()),
            move_processed_files: rp.move_processed_files.or(d.move_processed_files),
            allowed_extensions: rp.allowed_extensions.clone().or_else(|| d.allowed_extensions.clone()),
            exclude_patterns: rp.exclude_patterns.clone().or_else(|| d.exclude_patterns.clone()),
            include_subdirectories: rp.include_subdirectories.or(d.include_subdirectories),
            debounce_ms: rp.debounce_ms.or(d.debounce_ms),
            retries: rp.retries.or(d.retries),
            retry_delay_ms: rp.retry_delay_ms.or(d.retry_delay_ms),
            wait_for_file_ready_ms: rp.wait_for_file_ready_ms.or(d.wait_for_file_ready_ms),
            discard_zero_byte_files: rp.discard_zero_byte_files.or(d.discard_zero_byte_files),
            max_content_bytes: rp.max_content_bytes.or(d.max_content_bytes),
            streaming_threshold_bytes: rp.streaming_threshold_bytes.or(d.streaming_threshold_bytes),
            enable_circuit_breaker: rp.enable_circuit_breaker.or(d.enable_circuit_breaker),
            circuit_breaker_failure_threshold: rp
                .circuit_breaker_failure_threshold
                .or(d.circuit_breaker_failure_threshold),
            circuit_breaker_open_duration_ms: rp
                .circuit_breaker_open_duration_ms
                .or(d.circuit_breaker_open_duration_ms),
        };

        let action = merged.endpoint.clone().map(|endpoint| {
            ResolvedAction::RestPost(ResolvedRestPost {
                endpoint,
                bearer_token: merged.bearer_token.clone(),
                post_file_contents: merged.post_file_contents.unwrap_or(false),
                retries: merged.retries.unwrap_or(0),
                retry_delay_ms: merged.retry_delay_ms.unwrap_or(1000),
                max_content_bytes: merged.max_content_bytes.unwrap_or(10 * 1024 * 1024),
                streaming_threshold_bytes: merged.streaming_threshold_bytes.unwrap_or(1024 * 1024),
                enable_circuit_breaker: merged.enable_circuit_breaker.unwrap_or(false),
                circuit_breaker_failure_threshold: merged
                    .circuit_breaker_failure_threshold
                    .unwrap_or(5),
                circuit_breaker_open_duration_ms: merged
                    .circuit_breaker_open_duration_ms
                    .unwrap_or(30_000),
            })
        });

        Self {
            folder,
            allowed_extensions: merged.allowed_extensions.unwrap_or_default(),
            exclude_patterns: merged.exclude_patterns.unwrap_or_default(),
            include_subdirectories: merged.include_subdirectories.unwrap_or(false),
            debounce_ms: merged.debounce_ms.unwrap_or(300),
            wait_for_file_ready_ms: merged.wait_for_file_ready_ms.unwrap_or(0),
            discard_zero_byte_files: merged.discard_zero_byte_files.unwrap_or(false),
            processed_folder: merged.processed_folder.unwrap_or_else(|| "processed".to_string()),
            move_processed_files: merged.move_processed_files.unwrap_or(false),
            action,
        }
    }

    fn from_external_process(global: &GlobalConfig, folder: PathBuf, ep: &ExternalProcessConfig) -> Self {
        let d = &global.defaults;
        Self {
            folder,
            allowed_extensions: ep
                .allowed_extensions
                .clone()
                .or_else(|| d.allowed_extensions.clone())
                .unwrap_or_default(),
            exclude_patterns: ep
                .exclude_patterns
                .clone()
                .or_else(|| d.exclude_patterns.clone())
                .unwrap_or_default(),
            include_subdirectories: ep.include_subdirectories.or(d.include_subdirectories).unwrap_or(false),
            debounce_ms: ep.debounce_ms.or(d.debounce_ms).unwrap_or(300),
            // ExternalProcessConfig has no per-action override for these;
            // they only ever come from the global defaults.
            wait_for_file_ready_ms: d.wait_for_file_ready_ms.unwrap_or(0),
            discard_zero_byte_files: d.discard_zero_byte_files.unwrap_or(false),
            processed_folder: d.processed_folder.clone().unwrap_or_else(|| "processed".to_string()),
            move_processed_files: d.move_processed_files.unwrap_or(false),
            action: Some(ResolvedAction::ExternalProcess(ep.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;

    #[test]
    fn rest_post_action_overrides_global_default() {
        let mut global = GlobalConfig::default();
        global.defaults.retries = Some(1);
        global.defaults.endpoint = Some("https://default.example/hook".into());

        let action = ActionDef::RestPost(RestPostConfig {
            retries: Some(5),
            ..Default::default()
        });

        let effective = EffectiveConfig::resolve(&global, PathBuf::from("/watch"), Some(&action));
        match effective.action.unwrap() {
            ResolvedAction::RestPost(rp) => {
                assert_eq!(rp.retries, 5);
                assert_eq!(rp.endpoint, "https://default.example/hook");
            }
            _ => panic!("expected RestPost"),
        }
    }

    #[test]
    fn no_action_with_no_global_endpoint_yields_none() {
        let global = GlobalConfig::default();
        let effective = EffectiveConfig::resolve(&global, PathBuf::from("/watch"), None);
        assert!(effective.action.is_none());
    }

    #[test]
    fn external_process_action_inherits_global_defaults() {
        let mut global = GlobalConfig::default();
        global.defaults.debounce_ms = Some(750);
        global.defaults.allowed_extensions = Some(vec![".csv".to_string()]);
        global.defaults.move_processed_files = Some(true);
        global.defaults.processed_folder = Some("done".to_string());

        let action = ActionDef::ExternalProcess(ExternalProcessConfig {
            executable: "convert".to_string(),
            args: vec!["{path}".to_string()],
            allowed_extensions: None,
            exclude_patterns: None,
            include_subdirectories: None,
            debounce_ms: None,
            execution_timeout_ms: 30_000,
            ignore_output: false,
        });

        let effective = EffectiveConfig::resolve(&global, PathBuf::from("/watch"), Some(&action));
        assert_eq!(effective.debounce_ms, 750);
        assert_eq!(effective.allowed_extensions, vec![".csv".to_string()]);
        assert!(effective.move_processed_files);
        assert_eq!(effective.processed_folder, "done");
    }
}
