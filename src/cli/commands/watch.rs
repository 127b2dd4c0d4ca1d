//! The watch command: a local subscriber that prints every pushed snapshot.

use clap::Args;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::app::App;
use crate::cli::{GlobalArgs, Result};

/// Arguments for the watch command.
#[derive(Args, Debug)]
pub struct WatchArgs {}

impl WatchArgs {
    pub async fn run(self, app: &App, _global: &GlobalArgs) -> Result<()> {
        let mut subscription = app.context().subscribe()?;
        app.context().start_polling();
        info!(
            interval = ?app.context().poller().interval(),
            "watching for changes"
        );

        let mut stdout = tokio::io::stdout();
        loop {
            tokio::select! {
                payload = subscription.recv() => {
                    let Some(payload) = payload else {
                        break;
                    };
                    stdout.write_all(payload.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    break;
                }
            }
        }
        Ok(())
    }
}
