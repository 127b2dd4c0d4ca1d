//! Command-line interface for tree-mirror.

pub mod args;
mod commands;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::warn;

use crate::app::{App, AppError};
use crate::sync::SyncError;
use crate::telemetry;

pub use args::{GlobalArgs, InputSource, OutputSink};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during CLI execution.
#[derive(Debug, Error)]
pub enum CliError {
    /// Argument processing error.
    #[error("{0}")]
    Args(#[from] args::ArgsError),

    /// App error.
    #[error("{0}")]
    App(#[from] AppError),

    /// Snapshot or mutation error.
    #[error("{0}")]
    Sync(#[from] SyncError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

// =============================================================================
// CLI Definition
// =============================================================================

/// tree-mirror - Mirror a remote repository tree and stream its changes.
#[derive(Parser, Debug)]
#[command(name = "tree-mirror", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the mirror over HTTP until interrupted.
    Serve(commands::serve::ServeArgs),

    /// Assemble one snapshot and print it as JSON.
    Snapshot(commands::snapshot::SnapshotArgs),

    /// Poll the remote and print each changed snapshot as one JSON line.
    Watch(commands::watch::WatchArgs),

    /// Create or update a file.
    Put(commands::mutate::PutArgs),

    /// Delete a file.
    Rm(commands::mutate::RmArgs),

    /// Move a file.
    Mv(commands::mutate::MvArgs),
}

// =============================================================================
// CLI Execution
// =============================================================================

impl Cli {
    /// Parse command-line arguments and return the CLI instance.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        // Create the App from global arguments
        let app = App::new(self.global.to_app_context())?;

        telemetry::init(self.global.verbose, &app.config().logging.level);
        for warning in app.warnings() {
            warn!("{}", warning);
        }

        match self.command {
            Command::Serve(args) => args.run(&app, &self.global).await,
            Command::Snapshot(args) => args.run(&app, &self.global).await,
            Command::Watch(args) => args.run(&app, &self.global).await,
            Command::Put(args) => args.run(&app, &self.global).await,
            Command::Rm(args) => args.run(&app, &self.global).await,
            Command::Mv(args) => args.run(&app, &self.global).await,
        }
    }
}

/// Main entry point for the CLI.
pub async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli.run().await
}
