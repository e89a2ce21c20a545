//! Per-folder action definitions.
//!
//! Every field is optional; `null` (the field's absence) means "inherit the
//! global default" for `RestPost` fields, resolved against
//! [`GlobalConfig::defaults`] during effective-config merge.

use serde::{Deserialize, Serialize};

/// A named action a watched folder can be pointed at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ActionDef {
    RestPost(RestPostConfig),
    ExternalProcess(ExternalProcessConfig),
}

/// All fields optional: `None` inherits from `GlobalConfig.defaults`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestPostConfig {
    pub endpoint: Option<String>,
    pub bearer_token: Option<String>,
    pub post_file_contents: Option<bool>,
    pub processed_folder: Option<String>,
    pub move_processed_files: Option<bool>,
    pub allowed_extensions: Option<Vec<String>>,
    pub exclude_patterns: Option<Vec<String>>,
    pub include_subdirectories: Option<bool>,
    pub debounce_ms: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub wait_for_file_ready_ms: Option<u64>,
    pub discard_zero_byte_files: Option<bool>,
    pub max_content_bytes: Option<u64>,
    pub streaming_threshold_bytes: Option<u64>,
    pub enable_circuit_breaker: Option<bool>,
    pub circuit_breaker_failure_threshold: Option<u32>,
    pub circuit_breaker_open_duration_ms: Option<u64>,
}

/// Executes an external program per file. Unlike `RestPostConfig`, argv and
/// the executable path have no global default to inherit — a folder that
/// references an `ExternalProcess` action always names its own program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalProcessConfig {
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub allowed_extensions: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub include_subdirectories: Option<bool>,
    #[serde(default)]
    pub debounce_ms: Option<u64>,
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,
    #[serde(default)]
    pub ignore_output: bool,
}

fn default_execution_timeout_ms() -> u64 {
    30_000
}
