//! Configuration file reading and parsing.
//!
//! This module handles locating, reading, and parsing INI-format configuration files,
//! with support for layered overrides.

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use configparser::ini::Ini;
use thiserror::Error;

use super::{Config, Interval, Limit, LoggingConfig, PollConfig, RemoteConfig, ServerConfig};

// =============================================================================
// Constants - Default Values
// =============================================================================

const DEFAULT_REMOTE_BRANCH: &str = "main";
const DEFAULT_REMOTE_TOKEN_ENV: &str = "GITHUB_TOKEN";
const DEFAULT_REMOTE_USER_AGENT: &str = "tree-mirror";
const DEFAULT_REMOTE_MAX_CONCURRENT_REQUESTS: u32 = 16;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_POLL_START_ON_BOOT: bool = false;
const DEFAULT_SERVER_LISTEN: ([u8; 4], u16) = ([127, 0, 0, 1], 8080);
const DEFAULT_SERVER_ROUTE: &str = "/api/files";
const DEFAULT_SERVER_KEEP_ALIVE_SECS: u64 = 15;
const DEFAULT_LOGGING_LEVEL: &str = "info";

const ENV_CONFIG_FILE: &str = "TREE_MIRROR_CONFIG_FILE";
const DEFAULT_CONFIG_FILENAME: &str = ".treemirror";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid duration '{value}': {message}")]
    InvalidDuration { value: String, message: String },

    #[error("invalid integer '{value}': {source}")]
    InvalidInteger {
        value: String,
        source: std::num::ParseIntError,
    },

    #[error("invalid boolean '{value}' for key '{key}'")]
    InvalidBoolean { key: String, value: String },

    #[error("invalid override key '{key}': {message}")]
    InvalidOverrideKey { key: String, message: String },

    #[error("invalid listen address '{value}': {source}")]
    InvalidAddress {
        value: String,
        source: std::net::AddrParseError,
    },
}

/// Result type for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// =============================================================================
// ConfigSource
// =============================================================================

/// Specifies how to locate and layer configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    /// Explicit config file path from CLI. If specified and doesn't exist, error.
    /// If None, fall back to TREE_MIRROR_CONFIG_FILE env var, then ~/.treemirror.
    pub config_file: Option<PathBuf>,

    /// Additional override config file (layered on top of base config).
    pub override_file: Option<PathBuf>,

    /// Individual key=value overrides (applied last).
    /// Keys use dot-notation: "remote.url", "poll.interval"
    pub overrides: Vec<(String, String)>,
}

// =============================================================================
// Interval Parsing
// =============================================================================

impl Interval {
    /// Parse a time span from a string like "30s", "500ms", "2m", "1h", or plain "30" (seconds).
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConfigError::InvalidDuration {
                value: s.to_string(),
                message: "empty string".to_string(),
            });
        }

        // Find where the numeric part ends
        let num_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());

        if num_end == 0 {
            return Err(ConfigError::InvalidDuration {
                value: s.to_string(),
                message: "no numeric value".to_string(),
            });
        }

        let num_str = &s[..num_end];
        let suffix = s[num_end..].trim().to_lowercase();

        let base: u64 = num_str.parse().map_err(|e| ConfigError::InvalidDuration {
            value: s.to_string(),
            message: format!("invalid number: {}", e),
        })?;

        let duration = match suffix.as_str() {
            "ms" => Duration::from_millis(base),
            "" | "s" => Duration::from_secs(base),
            "m" => Duration::from_secs(base.saturating_mul(60)),
            "h" => Duration::from_secs(base.saturating_mul(60 * 60)),
            _ => {
                return Err(ConfigError::InvalidDuration {
                    value: s.to_string(),
                    message: format!("unknown suffix '{}'", suffix),
                });
            }
        };

        if duration.is_zero() {
            return Err(ConfigError::InvalidDuration {
                value: s.to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Interval(duration))
    }
}

// =============================================================================
// Value Parsing
// =============================================================================

fn parse_bool_value(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBoolean {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_limit_value_u32(value: &str) -> Result<Limit<u32>> {
    if value.eq_ignore_ascii_case("none") {
        Ok(Limit::Disabled)
    } else {
        let v: u32 = value.parse().map_err(|e| ConfigError::InvalidInteger {
            value: value.to_string(),
            source: e,
        })?;
        Ok(Limit::Value(v))
    }
}

fn parse_limit_value_interval(value: &str) -> Result<Limit<Interval>> {
    if value.eq_ignore_ascii_case("none") {
        Ok(Limit::Disabled)
    } else {
        Ok(Limit::Value(Interval::parse(value)?))
    }
}

fn parse_address(value: &str) -> Result<SocketAddr> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidAddress {
            value: value.to_string(),
            source: e,
        })
}

/// Routes are always absolute and never end in a slash.
fn normalize_route(value: &str) -> String {
    let trimmed = value.trim().trim_matches('/');
    format!("/{}", trimmed)
}

// =============================================================================
// Config File Resolution
// =============================================================================

/// Information about how the config file was resolved.
#[derive(Debug)]
pub struct ResolvedConfigFile {
    /// The path to the config file, if one was found.
    pub path: Option<PathBuf>,
    /// Warning message if env var pointed to nonexistent file.
    pub warning: Option<String>,
}

/// Resolve which config file to use based on the ConfigSource and environment.
fn resolve_config_file(source: &ConfigSource) -> Result<ResolvedConfigFile> {
    // If explicit path provided, it must exist
    if let Some(ref path) = source.config_file {
        if path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(path.clone()),
                warning: None,
            });
        } else {
            return Err(ConfigError::FileNotFound(path.clone()));
        }
    }

    // Check environment variable
    if let Ok(env_path) = env::var(ENV_CONFIG_FILE) {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(path),
                warning: None,
            });
        } else {
            // Warn but continue with defaults
            return Ok(ResolvedConfigFile {
                path: None,
                warning: Some(format!(
                    "config file specified by {} does not exist: {}",
                    ENV_CONFIG_FILE, env_path
                )),
            });
        }
    }

    // Check ~/.treemirror
    if let Some(home) = home_dir() {
        let default_path = home.join(DEFAULT_CONFIG_FILENAME);
        if default_path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(default_path),
                warning: None,
            });
        }
    }

    // No config file found
    Ok(ResolvedConfigFile {
        path: None,
        warning: None,
    })
}

/// Get the user's home directory.
fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

// =============================================================================
// Default Config
// =============================================================================

/// Create a Config with all default values.
fn default_config() -> Config {
    Config {
        remote: RemoteConfig {
            url: None,
            branch: DEFAULT_REMOTE_BRANCH.to_string(),
            token_env: DEFAULT_REMOTE_TOKEN_ENV.to_string(),
            user_agent: DEFAULT_REMOTE_USER_AGENT.to_string(),
            max_concurrent_requests: Limit::Value(DEFAULT_REMOTE_MAX_CONCURRENT_REQUESTS),
        },
        poll: PollConfig {
            interval: Interval(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)),
            start_on_boot: DEFAULT_POLL_START_ON_BOOT,
        },
        server: ServerConfig {
            listen: SocketAddr::from(DEFAULT_SERVER_LISTEN),
            route: DEFAULT_SERVER_ROUTE.to_string(),
            keep_alive: Limit::Value(Interval(Duration::from_secs(
                DEFAULT_SERVER_KEEP_ALIVE_SECS,
            ))),
        },
        logging: LoggingConfig {
            level: DEFAULT_LOGGING_LEVEL.to_string(),
        },
    }
}

// =============================================================================
// INI Parsing
// =============================================================================

/// Every key a config file may set, as (section, key).
const KNOWN_KEYS: &[(&str, &str)] = &[
    ("remote", "url"),
    ("remote", "branch"),
    ("remote", "token_env"),
    ("remote", "user_agent"),
    ("remote", "max_concurrent_requests"),
    ("poll", "interval"),
    ("poll", "start_on_boot"),
    ("server", "listen"),
    ("server", "route"),
    ("server", "keep_alive"),
    ("logging", "level"),
];

/// Apply an INI file's contents to a Config, layering on top of existing values.
///
/// Keys absent from the file keep their existing values. Unknown sections and
/// keys are ignored.
fn apply_ini_to_config(config: &mut Config, ini: &Ini) -> Result<()> {
    for (section, key) in KNOWN_KEYS {
        if let Some(value) = ini.get(section, key) {
            apply_setting(config, section, key, &value)?;
        }
    }
    Ok(())
}

/// Load and parse an INI file.
fn load_ini(path: &Path) -> Result<Ini> {
    let mut ini = Ini::new();
    ini.load(path).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e,
    })?;
    Ok(ini)
}

// =============================================================================
// Override Application
// =============================================================================

/// Apply a single key=value override to the config.
fn apply_override(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key.split_once('.') {
        Some((section, param)) => apply_setting(config, section, param, value),
        None => Err(ConfigError::InvalidOverrideKey {
            key: key.to_string(),
            message: "unrecognized key format".to_string(),
        }),
    }
}

fn apply_setting(config: &mut Config, section: &str, param: &str, value: &str) -> Result<()> {
    match section {
        "remote" => apply_remote_setting(&mut config.remote, param, value),
        "poll" => apply_poll_setting(&mut config.poll, param, value),
        "server" => apply_server_setting(&mut config.server, param, value),
        "logging" => apply_logging_setting(&mut config.logging, param, value),
        _ => Err(ConfigError::InvalidOverrideKey {
            key: format!("{}.{}", section, param),
            message: "unknown section".to_string(),
        }),
    }
}

fn apply_remote_setting(remote: &mut RemoteConfig, param: &str, value: &str) -> Result<()> {
    match param {
        "url" => {
            let url = value.trim();
            remote.url = (!url.is_empty()).then(|| url.to_string());
        }
        "branch" => remote.branch = value.trim().to_string(),
        "token_env" => remote.token_env = value.trim().to_string(),
        "user_agent" => remote.user_agent = value.trim().to_string(),
        "max_concurrent_requests" => {
            remote.max_concurrent_requests = parse_limit_value_u32(value.trim())?
        }
        _ => return Err(unknown_parameter("remote", param)),
    }
    Ok(())
}

fn apply_poll_setting(poll: &mut PollConfig, param: &str, value: &str) -> Result<()> {
    match param {
        "interval" => poll.interval = Interval::parse(value)?,
        "start_on_boot" => poll.start_on_boot = parse_bool_value(param, value.trim())?,
        _ => return Err(unknown_parameter("poll", param)),
    }
    Ok(())
}

fn apply_server_setting(server: &mut ServerConfig, param: &str, value: &str) -> Result<()> {
    match param {
        "listen" => server.listen = parse_address(value)?,
        "route" => server.route = normalize_route(value),
        "keep_alive" => server.keep_alive = parse_limit_value_interval(value.trim())?,
        _ => return Err(unknown_parameter("server", param)),
    }
    Ok(())
}

fn apply_logging_setting(logging: &mut LoggingConfig, param: &str, value: &str) -> Result<()> {
    match param {
        "level" => logging.level = value.trim().to_string(),
        _ => return Err(unknown_parameter("logging", param)),
    }
    Ok(())
}

fn unknown_parameter(section: &str, param: &str) -> ConfigError {
    ConfigError::InvalidOverrideKey {
        key: format!("{}.{}", section, param),
        message: "unknown parameter".to_string(),
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

/// Result of reading configuration, including any warnings.
#[derive(Debug)]
pub struct ConfigResult {
    /// The parsed configuration.
    pub config: Config,
    /// Any warnings generated during config loading.
    pub warnings: Vec<String>,
}

/// Read and parse configuration from the specified sources.
///
/// Configuration is layered in this order:
/// 1. Built-in defaults
/// 2. Base config file (from CLI, env var, or ~/.treemirror)
/// 3. Override config file (if specified)
/// 4. Individual overrides (applied last)
pub fn read_config(source: &ConfigSource) -> Result<ConfigResult> {
    let mut warnings = Vec::new();

    // Start with defaults
    let mut config = default_config();

    // Resolve and apply base config file
    let resolved = resolve_config_file(source)?;
    if let Some(warning) = resolved.warning {
        warnings.push(warning);
    }
    if let Some(ref path) = resolved.path {
        let ini = load_ini(path)?;
        apply_ini_to_config(&mut config, &ini)?;
    }

    // Apply override config file if specified
    if let Some(ref override_path) = source.override_file {
        if !override_path.exists() {
            return Err(ConfigError::FileNotFound(override_path.clone()));
        }
        let ini = load_ini(override_path)?;
        apply_ini_to_config(&mut config, &ini)?;
    }

    // Apply individual overrides
    for (key, value) in &source.overrides {
        apply_override(&mut config, key, value)?;
    }

    Ok(ConfigResult { config, warnings })
}

// =============================================================================
// Tests
// =============================================================================
