//! Command-line definition and dispatch.

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use logwarden::core::config::DaemonSettings;
use logwarden::core::errors::FatalError;
use logwarden::daemon::loop_main::Daemon;

/// Keeps log volumes from filling up by deleting the oldest idle log files.
#[derive(Debug, Parser)]
#[command(
    name = "logwarden",
    author,
    version,
    about = "Log volume free-space guardian",
    long_about = None
)]
pub struct Cli {
    /// File listing one absolute log directory per line.
    #[arg(short = 'c', value_name = "PATH", default_value = "config")]
    config: PathBuf,
    /// Dry run: log which files would be deleted without deleting them.
    #[arg(short = 'd')]
    dry_run: bool,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Fatal(_) => 1,
        }
    }
}

/// Load settings and run the daemon until a fatal error.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    let settings = DaemonSettings::load(cli.config.clone(), cli.dry_run)?;
    Daemon::new(settings)?.run()?;
    Ok(())
}
