//! Decoding fetched file bytes into node content, and encoding request
//! content back into bytes for the remote store.

use serde_json::Value;
use tracing::debug;

/// How a file's content is interpreted, chosen by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Json,
    Toml,
    Text,
}

impl ContentFormat {
    /// Pick the format for a file name.
    pub fn from_name(name: &str) -> Self {
        let extension = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => return ContentFormat::Text,
        };
        match extension.as_str() {
            "json" => ContentFormat::Json,
            "toml" => ContentFormat::Toml,
            _ => ContentFormat::Text,
        }
    }
}

/// Decode a file's bytes into the value stored on its node.
///
/// Structured formats that fail to parse fall back to the raw text; this never fails.
pub fn decode_content(name: &str, bytes: &[u8]) -> Value {
    let text = String::from_utf8_lossy(bytes).into_owned();

    let parsed = match ContentFormat::from_name(name) {
        ContentFormat::Text => None,
        ContentFormat::Json => serde_json::from_str::<Value>(&text)
            .map_err(|e| debug!(file = name, error = %e, "malformed json, keeping text"))
            .ok(),
        ContentFormat::Toml => toml::from_str::<toml::Value>(&text)
            .map_err(|e| debug!(file = name, error = %e, "malformed toml, keeping text"))
            .ok()
            .and_then(|value| serde_json::to_value(value).ok()),
    };

    parsed.unwrap_or(Value::String(text))
}

/// Encode request content for writing: strings verbatim, anything else as
/// pretty-printed JSON.
pub fn encode_content(content: &Value) -> serde_json::Result<Vec<u8>> {
    match content {
        Value::String(text) => Ok(text.as_bytes().to_vec()),
        other => serde_json::to_vec_pretty(other),
    }
}
