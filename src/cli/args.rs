//! Command-line argument definitions and helpers.

use std::path::PathBuf;

use clap::{ArgAction, Args};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::app::AppContext;
use crate::config::ConfigSource;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during argument processing.
#[derive(Debug, Error)]
pub enum ArgsError {
    /// I/O error reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid argument combination.
    #[error("{0}")]
    InvalidArgs(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for argument operations.
pub type Result<T> = std::result::Result<T, ArgsError>;

// =============================================================================
// Global Arguments
// =============================================================================

/// Global arguments that apply to all commands.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Path to the main configuration file.
    #[arg(long = "config-file", global = true)]
    pub config_file: Option<PathBuf>,

    /// Path to the configuration overrides file.
    #[arg(long = "config-file-overrides", global = true)]
    pub config_file_overrides: Option<PathBuf>,

    /// Configuration overrides in the form name=value.
    #[arg(long = "config", value_parser = parse_config_override, global = true)]
    pub config_overrides: Vec<(String, String)>,

    /// Remote URL, overriding remote.url from the configuration.
    #[arg(long = "remote", global = true)]
    pub remote: Option<String>,

    /// Increase log verbosity (repeatable).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl GlobalArgs {
    /// Convert to a ConfigSource for reading configuration.
    pub fn to_config_source(&self) -> ConfigSource {
        ConfigSource {
            config_file: self.config_file.clone(),
            override_file: self.config_file_overrides.clone(),
            overrides: self.config_overrides.clone(),
        }
    }

    /// Convert to an AppContext for creating an App.
    pub fn to_app_context(&self) -> AppContext {
        AppContext {
            config_source: self.to_config_source(),
            remote: self.remote.clone(),
        }
    }
}

/// Parse a config override from "name=value" format.
fn parse_config_override(s: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid config override '{}': expected name=value", s))?;
    Ok((name.to_string(), value.to_string()))
}

// =============================================================================
// Input/Output Helpers
// =============================================================================

/// Helper for commands that read input from an argument, file, or stdin.
#[derive(Args, Debug, Default)]
pub struct InputSource {
    /// Read input from this file instead of an argument.
    #[arg(id = "input_file", short = 'f', long = "input-file")]
    pub file: Option<PathBuf>,
}

impl InputSource {
    /// Read the input bytes.
    ///
    /// If `arg_value` is provided, returns it (error if file is also set).
    /// If `file` is set, reads from the file.
    /// Otherwise, reads from stdin.
    ///
    /// File and stdin contents are returned exactly as read.
    pub async fn read(&self, arg_value: Option<&str>) -> Result<Vec<u8>> {
        match (arg_value, &self.file) {
            (Some(_), Some(_)) => Err(ArgsError::InvalidArgs(
                "cannot specify both a value argument and --input-file".to_string(),
            )),
            (Some(value), None) => Ok(value.as_bytes().to_vec()),
            (None, Some(path)) => Ok(tokio::fs::read(path).await?),
            (None, None) => {
                let mut contents = Vec::new();
                tokio::io::stdin().read_to_end(&mut contents).await?;
                Ok(contents)
            }
        }
    }
}

/// Helper for commands that write output to a file or stdout.
#[derive(Args, Debug, Default)]
pub struct OutputSink {
    /// Write output to this file instead of stdout.
    #[arg(id = "output_file", short = 'o', long = "output-file")]
    pub file: Option<PathBuf>,
}

impl OutputSink {
    /// Write a string value to the output.
    pub async fn write_str(&self, value: &str) -> Result<()> {
        match &self.file {
            Some(path) => {
                tokio::fs::write(path, value).await?;
            }
            None => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(value.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }
        Ok(())
    }

    /// Write a value to the output as JSON.
    pub async fn write_json<T: serde::Serialize>(&self, value: &T, compact: bool) -> Result<()> {
        let output = if compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        self.write_str(&output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_override() {
        assert_eq!(
            parse_config_override("poll.interval=5s").unwrap(),
            ("poll.interval".to_string(), "5s".to_string())
        );
        assert_eq!(
            parse_config_override("remote.url=memory:a=b").unwrap(),
            ("remote.url".to_string(), "memory:a=b".to_string())
        );
        assert!(parse_config_override("poll.interval").is_err());
    }

    #[tokio::test]
    async fn test_input_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        tokio::fs::write(&path, "line\n").await.unwrap();

        let from_arg = InputSource::default();
        assert_eq!(from_arg.read(Some("value")).await.unwrap(), b"value".to_vec());

        let from_file = InputSource { file: Some(path) };
        assert_eq!(from_file.read(None).await.unwrap(), b"line\n".to_vec());
        assert!(matches!(
            from_file.read(Some("value")).await,
            Err(ArgsError::InvalidArgs(_))
        ));
    }

    #[tokio::test]
    async fn test_output_sink_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let sink = OutputSink {
            file: Some(path.clone()),
        };

        sink.write_json(&serde_json::json!({"a": 1}), true).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), r#"{"a":1}"#);
    }
}
