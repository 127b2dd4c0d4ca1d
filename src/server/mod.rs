//! The HTTP request surface.
//!
//! One configurable route carries everything:
//!
//! - `GET` returns a freshly assembled snapshot, or with `?stream=1` (or
//!   `Accept: text/event-stream`) opens a Server-Sent-Events stream of
//!   snapshots and starts the poll scheduler.
//! - `POST` and `PUT` create or update a file; `PUT` with `"action": "move"`
//!   moves one.
//! - `DELETE` removes a file.
//!
//! `GET /health` answers `OK`.

mod error;
mod handlers;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::sync::{MutationCoordinator, SyncContext};

pub use error::{ApiError, Result};
pub use handlers::{DeleteRequest, MutationResponse, SaveRequest};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ServerState {
    pub(crate) context: Arc<SyncContext>,
    pub(crate) coordinator: Arc<MutationCoordinator>,
    /// Interval between keep-alive comments on streams, if any.
    pub(crate) keep_alive: Option<Duration>,
}

impl ServerState {
    pub fn new(
        context: Arc<SyncContext>,
        coordinator: Arc<MutationCoordinator>,
        keep_alive: Option<Duration>,
    ) -> Self {
        Self {
            context,
            coordinator,
            keep_alive,
        }
    }
}

/// Build the router, mounting the files handlers at `route`.
pub fn router(state: ServerState, route: &str) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            route,
            get(handlers::read)
                .post(handlers::create)
                .put(handlers::update)
                .delete(handlers::remove),
        )
        .with_state(state)
}

/// Serve `app` on `listener` until Ctrl-C.
///
/// Streams never finish on their own, so shutdown does not wait for open
/// connections to drain.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    info!(address = %listener.local_addr()?, "listening");

    tokio::select! {
        result = axum::serve(listener, app).into_future() => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutting down");
            Ok(())
        }
    }
}
