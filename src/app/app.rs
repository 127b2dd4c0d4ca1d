//! Top-level application component.
//!
//! The [`App`] owns all global services and is the root for the application's functionality.

use std::sync::Arc;

use thiserror::Error;

use crate::backend::{create_backend, ContentBackend, CreateBackendError};
use crate::config::{read_config, Config, ConfigSource};
use crate::server::ServerState;
use crate::sync::{MutationCoordinator, SyncContext};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during App operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend creation error.
    #[error("failed to create backend: {0}")]
    CreateBackend(#[from] CreateBackendError),
}

/// Result type for App operations.
pub type Result<T> = std::result::Result<T, AppError>;

// =============================================================================
// Context Types
// =============================================================================

/// Context for creating an App.
#[derive(Default)]
pub struct AppContext {
    /// Source for configuration files.
    pub config_source: ConfigSource,
    /// Remote URL that takes precedence over `remote.url`.
    pub remote: Option<String>,
}

// =============================================================================
// App
// =============================================================================

/// The top-level application component.
///
/// Owns the configuration, the remote backend, the synchronization context and
/// the mutation coordinator. Everything that touches the mirror goes through
/// one App, so there is exactly one cache and one subscriber set per process.
pub struct App {
    config: Config,
    warnings: Vec<String>,
    backend: Arc<dyn ContentBackend>,
    context: Arc<SyncContext>,
    coordinator: Arc<MutationCoordinator>,
}

impl App {
    /// Create a new App with the given context.
    pub fn new(ctx: AppContext) -> Result<Self> {
        let config_result =
            read_config(&ctx.config_source).map_err(|e| AppError::Config(e.to_string()))?;

        let mut config = config_result.config;
        if let Some(remote) = ctx.remote {
            config.remote.url = Some(remote);
        }

        let backend = create_backend(&config.remote)?;
        let mut app = Self::with_backend(config, backend);
        app.warnings = config_result.warnings;
        Ok(app)
    }

    /// Create an App around an existing backend.
    pub fn with_backend(config: Config, backend: Arc<dyn ContentBackend>) -> Self {
        let context = SyncContext::new(Arc::clone(&backend), config.poll.interval.0);
        let coordinator = Arc::new(MutationCoordinator::new(
            Arc::clone(&backend),
            Arc::clone(&context),
        ));

        Self {
            config,
            warnings: Vec::new(),
            backend,
            context,
            coordinator,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Warnings produced while reading configuration.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn backend(&self) -> &Arc<dyn ContentBackend> {
        &self.backend
    }

    /// Get the synchronization context.
    pub fn context(&self) -> &Arc<SyncContext> {
        &self.context
    }

    /// Get the mutation coordinator.
    pub fn coordinator(&self) -> &Arc<MutationCoordinator> {
        &self.coordinator
    }

    /// State for the HTTP server, sharing this App's context and coordinator.
    pub fn server_state(&self) -> ServerState {
        ServerState::new(
            Arc::clone(&self.context),
            Arc::clone(&self.coordinator),
            self.config.server.keep_alive.value().map(|interval| interval.0),
        )
    }
}
