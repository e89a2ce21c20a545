//! FileWatchRest - watches directories for new or changed files and posts
//! notifications to a REST endpoint, with retry, streaming, and
//! circuit-breaking.

mod actions;
mod cli;
mod config;
mod core;
mod debounce;
mod diagnostics;
mod logger;
mod pattern;
mod resilience;
mod sender;
mod watcher;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use config::GlobalConfig;
use diagnostics::Diagnostics;

#[tokio::main]
async fn main() -> Result<()> {
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();
    logger::set_verbose(cli.verbose);

    let config_path = resolve_config_path(&cli);
    let global = GlobalConfig::load(&config_path)?;

    if let Some(file_path) = &global.logging.file_path
        && let Ok(sink) = logger::sink::open_sink(file_path, global.logging.format)
    {
        logger::install_sink(sink);
    }
    logger::set_verbose(cli.verbose || global.logging.verbose);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::ValidateConfig => validate_config(&global),
        Commands::ShowConfig => show_config(&global),
        Commands::Run => run(global).await,
    }
}

fn resolve_config_path(cli: &Cli) -> PathBuf {
    if let Some(path) = cli.config_path_override() {
        return path.clone();
    }
    let args: Vec<String> = std::env::args().skip(1).collect();
    let env_var = std::env::var("FILEWATCHREST_CONFIG").ok();
    let program_data = program_data_dir();
    config::path::get_config_path(&args, env_var.as_deref(), &program_data, |p| p.exists())
}

#[cfg(target_os = "windows")]
fn program_data_dir() -> PathBuf {
    std::env::var("PROGRAMDATA").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(r"C:\ProgramData"))
}

#[cfg(not(target_os = "windows"))]
fn program_data_dir() -> PathBuf {
    PathBuf::from("/etc")
}

fn validate_config(global: &GlobalConfig) -> Result<()> {
    match global.validate() {
        Ok(diag) if !diag.has_errors() => {
            crate::log!("config"; "valid: {} folder(s), {} action(s)", global.folders.len(), global.actions.len());
            Ok(())
        }
        Ok(diag) => Err(anyhow::anyhow!(diag)),
        Err(e) => Err(e.into()),
    }
}

fn show_config(global: &GlobalConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(global)?);
    Ok(())
}

async fn run(global: GlobalConfig) -> Result<()> {
    let global = config::init_config(global);
    let diagnostics = Arc::new(Diagnostics::new());
    let cancel = core::cancellation_token();

    crate::log!("watch"; "starting with {} watched folder(s)", global.folders.len());
    worker::Worker::run(diagnostics, cancel).await
}
