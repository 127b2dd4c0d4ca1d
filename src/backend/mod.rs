//! The remote repository content store.

mod content_backend;
mod create_backend;
mod http_backend;
mod memory_backend;

pub use content_backend::{
    base_name, join_path, normalize_path, BackendError, ContentBackend, DeleteResult, EntryKind,
    RemoteEntry, Result, VersionToken, WriteResult,
};
pub use create_backend::{create_backend, BackendType, CreateBackendError};
pub use http_backend::{HttpBackend, HttpBackendConfig};
pub use memory_backend::{content_token, MemoryBackend, MemoryBackendBuilder};
