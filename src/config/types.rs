//! Configuration types for tree-mirror.
//!
//! This module defines the structures used to represent application configuration
//! as parsed from an INI-format config file.

use std::net::SocketAddr;
use std::time::Duration;

// =============================================================================
// Primitive Types
// =============================================================================

/// A time span that can be parsed from strings like "30s", "500ms", "2m", etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval(pub Duration);

/// Represents a limit that can be disabled or set.
///
/// - `Disabled`: Explicitly set to "none"
/// - `Value(T)`: Specific limit value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Limit<T> {
    Disabled,
    Value(T),
}

impl<T> Limit<T> {
    /// The configured value, or `None` when disabled.
    pub fn value(&self) -> Option<&T> {
        match self {
            Limit::Value(v) => Some(v),
            Limit::Disabled => None,
        }
    }
}

// =============================================================================
// Config Sections
// =============================================================================

/// [remote] section - the repository being mirrored.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// `memory:` or the base URL of a contents API.
    pub url: Option<String>,
    pub branch: String,
    /// Name of the environment variable holding the bearer token.
    pub token_env: String,
    pub user_agent: String,
    pub max_concurrent_requests: Limit<u32>,
}

/// [poll] section - the background poll scheduler.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Interval,
    /// Start polling when the server starts instead of on the first stream.
    pub start_on_boot: bool,
}

/// [server] section - the HTTP request surface.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub route: String,
    /// Interval between keep-alive comments on streaming responses.
    pub keep_alive: Limit<Interval>,
}

/// [logging] section.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

// =============================================================================
// Top-Level Config
// =============================================================================

/// Complete application configuration as parsed from config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub remote: RemoteConfig,
    pub poll: PollConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}
