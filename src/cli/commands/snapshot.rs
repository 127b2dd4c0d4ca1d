//! The snapshot command.

use clap::Args;

use crate::app::App;
use crate::cli::{GlobalArgs, OutputSink, Result};

/// Arguments for the snapshot command.
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Print on one line instead of pretty-printing.
    #[arg(long)]
    pub compact: bool,

    #[command(flatten)]
    pub output: OutputSink,
}

impl SnapshotArgs {
    pub async fn run(self, app: &App, _global: &GlobalArgs) -> Result<()> {
        let snapshot = app.context().assembler().assemble().await?;
        self.output.write_json(&snapshot, self.compact).await?;
        Ok(())
    }
}
