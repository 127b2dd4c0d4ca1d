//! Backend creation from a remote specification.
//!
//! A remote is named by URL: `memory:` selects an empty in-memory store, and
//! `http://` / `https://` URLs select the contents-API backend rooted at that URL.

use std::env;
use std::sync::Arc;

use thiserror::Error;

use crate::backend::{BackendError, ContentBackend, HttpBackend, HttpBackendConfig, MemoryBackend};
use crate::config::{Limit, RemoteConfig};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during backend creation.
#[derive(Debug, Error)]
pub enum CreateBackendError {
    /// No remote URL was configured.
    #[error("no remote configured (set remote.url or pass --remote)")]
    MissingUrl,

    /// The URL scheme is not supported.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Backend construction failed.
    #[error("failed to create backend: {0}")]
    CreationError(#[from] BackendError),
}

/// Result type for backend creation.
pub type Result<T> = std::result::Result<T, CreateBackendError>;

// =============================================================================
// Parsed Remote Specification
// =============================================================================

/// The kind of backend indicated by a remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendType {
    /// In-memory store (memory: URL).
    Memory,
    /// Contents API over HTTP (http:// or https:// URL).
    Http,
}

impl BackendType {
    /// Determine the backend type from a URL.
    pub fn from_url(url: &str) -> Result<Self> {
        if url.starts_with("memory:") {
            return Ok(BackendType::Memory);
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(BackendType::Http);
        }
        let scheme = url.split_once(':').map_or(url, |(scheme, _)| scheme);
        Err(CreateBackendError::UnsupportedScheme(scheme.to_string()))
    }
}

// =============================================================================
// Backend Creation
// =============================================================================

/// Create the backend described by the `[remote]` configuration.
///
/// The bearer token is read from the environment variable named by
/// `token_env`; an unset or empty variable means unauthenticated access.
pub fn create_backend(config: &RemoteConfig) -> Result<Arc<dyn ContentBackend>> {
    let url = config.url.as_deref().ok_or(CreateBackendError::MissingUrl)?;

    match BackendType::from_url(url)? {
        BackendType::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendType::Http => {
            let token = env::var(&config.token_env)
                .ok()
                .filter(|token| !token.is_empty());
            let backend = HttpBackend::new(HttpBackendConfig {
                base_url: url.to_string(),
                branch: config.branch.clone(),
                token,
                user_agent: config.user_agent.clone(),
                max_concurrent_requests: config.max_concurrent_requests.value().copied(),
            })?;
            Ok(Arc::new(backend))
        }
    }
}
