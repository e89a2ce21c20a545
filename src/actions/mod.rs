//! External-process action execution.
//!
//! `RestPost` actions are driven entirely by the sender pool; this module
//! handles the other action kind, invoked directly from the Orchestrator's
//! change-event pipeline since it has no debounce/retry/circuit machinery of
//! its own.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::ExternalProcessConfig;

/// Run `config.executable` with `config.args`, substituting the literal
/// placeholder `{path}` with the triggering file's path in each argument.
/// Waits up to `execution_timeout_ms`, killing the child and returning an
/// error if it overruns.
pub async fn run_external_process(config: &ExternalProcessConfig, path: &Path) -> anyhow::Result<()> {
    let path_str = path.to_string_lossy();
    let args: Vec<String> = config
        .args
        .iter()
        .map(|a| a.replace("{path}", &path_str))
        .collect();

    let mut cmd = Command::new(&config.executable);
    cmd.args(&args).kill_on_drop(true);
    if config.ignore_output {
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
    } else {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    }

    let mut child = cmd.spawn()?;
    let timeout = Duration::from_millis(config.execution_timeout_ms);

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            if !output.status.success() {
                crate::log!(
                    "action";
                    "{} exited with {} for {}",
                    config.executable,
                    output.status,
                    path.display()
                );
            } else if !config.ignore_output {
                crate::debug!("action"; "{} completed for {}", config.executable, path.display());
            }
            Ok(())
        }
        Ok(Err(e)) => Err(anyhow::anyhow!("failed to run {}: {e}", config.executable)),
        Err(_) => {
            crate::log!(
                "action";
                "{} timed out after {}ms for {}, killing",
                config.executable,
                config.execution_timeout_ms,
                path.display()
            );
            Err(anyhow::anyhow!("{} timed out for {}", config.executable, path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(executable: &str, args: Vec<&str>, timeout_ms: u64) -> ExternalProcessConfig {
        ExternalProcessConfig {
            executable: executable.to_string(),
            args: args.into_iter().map(str::to_string).collect(),
            allowed_extensions: None,
            exclude_patterns: None,
            include_subdirectories: None,
            debounce_ms: None,
            execution_timeout_ms: timeout_ms,
            ignore_output: true,
        }
    }

    #[tokio::test]
    async fn substitutes_path_placeholder_and_succeeds() {
        let cfg = config("true", vec!["{path}"], 5_000);
        let result = run_external_process(&cfg, &PathBuf::from("/tmp/a.txt")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn kills_and_errors_on_timeout() {
        let cfg = config("sleep", vec!["5"], 50);
        let result = run_external_process(&cfg, &PathBuf::from("/tmp/a.txt")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_treated_as_error() {
        let cfg = config("false", vec![], 5_000);
        let result = run_external_process(&cfg, &PathBuf::from("/tmp/a.txt")).await;
        assert!(result.is_ok());
    }
}
