//! The serve command.

use std::net::SocketAddr;

use clap::Args;
use tokio::net::TcpListener;

use crate::app::App;
use crate::cli::{GlobalArgs, Result};
use crate::server;

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on, overriding server.listen.
    #[arg(long)]
    pub listen: Option<SocketAddr>,
}

impl ServeArgs {
    pub async fn run(self, app: &App, _global: &GlobalArgs) -> Result<()> {
        let config = &app.config().server;
        let listen = self.listen.unwrap_or(config.listen);

        if app.config().poll.start_on_boot {
            app.context().start_polling();
        }

        let router = server::router(app.server_state(), &config.route);
        let listener = TcpListener::bind(listen).await?;
        server::serve(listener, router).await?;
        Ok(())
    }
}
