//! Error types for sync operations.

use crate::backend::BackendError;

/// Error type for sync operations.
///
/// Per-file content failures never appear here: they are recorded on the
/// affected file node and the rest of the tree is still built. Structured
/// content that fails to parse is not an error at all; it degrades to text.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A directory listing was unavailable; the whole tree read fails.
    #[error("failed to list remote directory '{path}': {source}")]
    RemoteList {
        path: String,
        #[source]
        source: BackendError,
    },

    /// The target of a mutation does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote store rejected a version token: someone else changed the path.
    #[error("version conflict on '{0}': the remote copy changed, re-read and retry")]
    RemoteWriteConflict(String),

    /// The request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Any other remote store failure.
    #[error("remote store error: {0}")]
    Backend(#[from] BackendError),

    /// A snapshot could not be serialized.
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
