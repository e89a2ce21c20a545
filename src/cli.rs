//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Watches directories for new or changed files and dispatches per-folder
/// actions (REST notification or external process).
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path. Overrides the discovery precedence (`-c`,
    /// positional argv, `FILEWATCHREST_CONFIG`, then the platform default).
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Short form of `--config`.
    #[arg(short = 'c', value_hint = clap::ValueHint::FilePath, hide = true)]
    pub config_short: Option<PathBuf>,

    /// Enable verbose (debug-level) console logging.
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the watcher service (default when no subcommand is given).
    Run,

    /// Validate the config document and exit, reporting every problem found.
    ValidateConfig,

    /// Print the effective (normalized, defaulted) config document as JSON.
    ShowConfig,
}

impl Cli {
    /// The `-c`/`--config` value, whichever was given.
    pub fn config_path_override(&self) -> Option<&PathBuf> {
        self.config.as_ref().or(self.config_short.as_ref())
    }
}
