use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque token the remote store assigns to a path's current content.
///
/// Doubles as the optimistic-concurrency precondition for writes and deletes.
pub type VersionToken = String;

/// Whether a listed entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One immediate child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// The base name of the entry.
    pub name: String,
    /// Slash-separated path relative to the repository root.
    pub path: String,
    /// File or directory.
    pub kind: EntryKind,
    /// The remote store's content identity for this entry.
    pub version_token: VersionToken,
    /// Size in bytes, when the store reports one.
    pub size: Option<u64>,
    /// Location the raw content can be downloaded from, when the store reports one.
    pub source_url: Option<String>,
}

/// Error type for backend operations.
#[derive(Debug)]
pub enum BackendError {
    /// The path does not exist.
    NotFound,
    /// A directory listing was requested for something that is not a directory.
    NotADirectory(String),
    /// The remote store answered with something we could not interpret.
    InvalidResponse(String),
    /// A transport-level failure talking to the remote store.
    Http(String),
    /// A custom error message.
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotFound => write!(f, "not found"),
            BackendError::NotADirectory(path) => write!(f, "not a directory: '{}'", path),
            BackendError::InvalidResponse(msg) => write!(f, "invalid response: {}", msg),
            BackendError::Http(msg) => write!(f, "http error: {}", msg),
            BackendError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Http(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// The result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// The write succeeded; contains the path's new version token.
    Success(VersionToken),
    /// The write was rejected because the path's current version did not match
    /// the expected one. Contains the actual current token (if any).
    Mismatch(Option<VersionToken>),
}

/// The result of a conditional delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteResult {
    /// The path was deleted.
    Success,
    /// The delete was rejected because the path's current version did not
    /// match. Contains the actual current token (if any).
    Mismatch(Option<VersionToken>),
}

/// The remote repository content store.
///
/// Paths are slash-separated and relative to the repository root; the root
/// itself is the empty string. Every mutating call carries a commit message
/// because the remote store records each write as a commit.
#[async_trait]
pub trait ContentBackend: Send + Sync {
    /// List the immediate entries of a directory, in the store's order.
    ///
    /// Returns `BackendError::NotFound` if the path does not exist and
    /// `BackendError::NotADirectory` if it names a file.
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Read the raw bytes of a file.
    async fn fetch_content(&self, path: &str) -> Result<Vec<u8>>;

    /// Get the current version token of a file, or `None` if no file exists there.
    async fn get_version_token(&self, path: &str) -> Result<Option<VersionToken>>;

    /// Write a file.
    ///
    /// `expected` is the precondition: `None` means the file must not exist yet,
    /// `Some(token)` means its current token must equal `token`.
    async fn write(
        &self,
        path: &str,
        content: &[u8],
        expected: Option<&VersionToken>,
        message: &str,
    ) -> Result<WriteResult>;

    /// Delete a file whose current token must equal `expected`.
    ///
    /// Returns `BackendError::NotFound` if the file does not exist.
    async fn delete(&self, path: &str, expected: &VersionToken, message: &str)
        -> Result<DeleteResult>;
}

/// Strip leading and trailing slashes and collapse empty segments.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a parent path and a child name, treating `""` as the root.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// The final segment of a path (the root's name is `""`).
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
