use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::content_backend::{
    join_path, normalize_path, BackendError, ContentBackend, DeleteResult, EntryKind, RemoteEntry,
    Result, VersionToken, WriteResult,
};

/// Compute the version token of a file's content: lowercase hex sha-256.
pub fn content_token(content: &[u8]) -> VersionToken {
    hex::encode(Sha256::digest(content))
}

#[derive(Default)]
struct MemoryState {
    /// File path -> contents. Directories exist implicitly as path prefixes.
    files: BTreeMap<String, Vec<u8>>,
    failing_listings: HashSet<String>,
    failing_content: HashSet<String>,
}

impl MemoryState {
    fn is_directory(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        let prefix = format!("{}/", path);
        self.files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix))
    }

    /// Immediate children of a directory, sorted by name.
    fn children(&self, dir: &str) -> BTreeMap<String, EntryKind> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        let mut children = BTreeMap::new();
        for key in self.files.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((sub, _)) => {
                    children.insert(sub.to_string(), EntryKind::Directory);
                }
                None => {
                    children.insert(rest.to_string(), EntryKind::File);
                }
            }
        }
        children
    }

    /// A directory's token hashes its children's kinds, names and tokens, so any
    /// change beneath it changes the directory's token too.
    fn directory_token(&self, dir: &str) -> VersionToken {
        let mut hasher = Sha256::new();
        for (name, kind) in self.children(dir) {
            let path = join_path(dir, &name);
            let (tag, token) = match kind {
                EntryKind::Directory => ("tree", self.directory_token(&path)),
                EntryKind::File => ("blob", self.file_token(&path).unwrap_or_default()),
            };
            hasher.update(format!("{} {} {}\n", tag, name, token).as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    fn file_token(&self, path: &str) -> Option<VersionToken> {
        self.files.get(path).map(|c| content_token(c))
    }

    fn has_file_ancestor(&self, path: &str) -> bool {
        let mut ancestor = String::new();
        let mut segments = path.split('/').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                break;
            }
            ancestor = join_path(&ancestor, segment);
            if self.files.contains_key(&ancestor) {
                return true;
            }
        }
        false
    }
}

/// Builder for constructing a MemoryBackend.
#[derive(Default)]
pub struct MemoryBackendBuilder {
    state: MemoryState,
}

impl MemoryBackendBuilder {
    /// Add a file. Parent directories are implied by the path.
    pub fn file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.state.files.insert(normalize_path(path), content.into());
        self
    }

    /// Make listing this directory fail.
    pub fn fail_listing(mut self, path: &str) -> Self {
        self.state.failing_listings.insert(normalize_path(path));
        self
    }

    /// Make fetching this file's content fail.
    pub fn fail_content(mut self, path: &str) -> Self {
        self.state.failing_content.insert(normalize_path(path));
        self
    }

    /// Build the MemoryBackend.
    pub fn build(self) -> MemoryBackend {
        MemoryBackend {
            state: RwLock::new(self.state),
            writes: AtomicUsize::new(0),
        }
    }
}

/// An in-memory implementation of `ContentBackend`, intended primarily for testing.
///
/// Version tokens are content hashes, so writing identical bytes back to a
/// path leaves its token unchanged.
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
    writes: AtomicUsize,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new builder for constructing a MemoryBackend.
    pub fn builder() -> MemoryBackendBuilder {
        MemoryBackendBuilder::default()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace a file's contents directly, bypassing version checks.
    ///
    /// Simulates a change made by some other writer to the remote store.
    pub fn put_file(&self, path: &str, content: impl Into<Vec<u8>>) {
        self.write_state()
            .files
            .insert(normalize_path(path), content.into());
    }

    /// Remove a file directly, bypassing version checks.
    pub fn remove_file(&self, path: &str) {
        self.write_state().files.remove(&normalize_path(path));
    }

    /// Get a file's current contents.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.read_state().files.get(&normalize_path(path)).cloned()
    }

    /// Make listing a directory fail (or succeed again).
    pub fn set_listing_fails(&self, path: &str, fails: bool) {
        let path = normalize_path(path);
        let mut state = self.write_state();
        if fails {
            state.failing_listings.insert(path);
        } else {
            state.failing_listings.remove(&path);
        }
    }

    /// Make fetching a file's content fail (or succeed again).
    pub fn set_content_fails(&self, path: &str, fails: bool) {
        let path = normalize_path(path);
        let mut state = self.write_state();
        if fails {
            state.failing_content.insert(path);
        } else {
            state.failing_content.remove(&path);
        }
    }

    /// Number of successful writes and deletes performed through the backend API.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentBackend for MemoryBackend {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let path = normalize_path(path);
        let state = self.read_state();

        if state.failing_listings.contains(&path) {
            return Err(BackendError::Other(format!(
                "listing unavailable for '{}'",
                path
            )));
        }
        if state.files.contains_key(&path) {
            return Err(BackendError::NotADirectory(path));
        }
        if !state.is_directory(&path) {
            return Err(BackendError::NotFound);
        }

        let entries = state
            .children(&path)
            .into_iter()
            .map(|(name, kind)| {
                let entry_path = join_path(&path, &name);
                let (version_token, size) = match kind {
                    EntryKind::Directory => (state.directory_token(&entry_path), None),
                    EntryKind::File => {
                        let content = &state.files[&entry_path];
                        (content_token(content), Some(content.len() as u64))
                    }
                };
                RemoteEntry {
                    source_url: Some(format!("memory:{}", entry_path)),
                    name,
                    path: entry_path,
                    kind,
                    version_token,
                    size,
                }
            })
            .collect();

        Ok(entries)
    }

    async fn fetch_content(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize_path(path);
        let state = self.read_state();

        if state.failing_content.contains(&path) {
            return Err(BackendError::Other(format!(
                "content unavailable for '{}'",
                path
            )));
        }
        state.files.get(&path).cloned().ok_or(BackendError::NotFound)
    }

    async fn get_version_token(&self, path: &str) -> Result<Option<VersionToken>> {
        Ok(self.read_state().file_token(&normalize_path(path)))
    }

    async fn write(
        &self,
        path: &str,
        content: &[u8],
        expected: Option<&VersionToken>,
        _message: &str,
    ) -> Result<WriteResult> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Err(BackendError::Other("cannot write to the root".to_string()));
        }

        let mut state = self.write_state();
        if state.is_directory(&path) {
            return Err(BackendError::Other(format!("'{}' is a directory", path)));
        }
        if state.has_file_ancestor(&path) {
            return Err(BackendError::Other(format!(
                "a parent of '{}' is a file",
                path
            )));
        }

        let current = state.file_token(&path);
        let matches = match (&current, expected) {
            (None, None) => true,
            (Some(current), Some(exp)) => current == exp,
            _ => false,
        };
        if !matches {
            return Ok(WriteResult::Mismatch(current));
        }

        state.files.insert(path, content.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(WriteResult::Success(content_token(content)))
    }

    async fn delete(
        &self,
        path: &str,
        expected: &VersionToken,
        _message: &str,
    ) -> Result<DeleteResult> {
        let path = normalize_path(path);
        let mut state = self.write_state();

        let current = state.file_token(&path).ok_or(BackendError::NotFound)?;
        if &current != expected {
            return Ok(DeleteResult::Mismatch(Some(current)));
        }

        state.files.remove(&path);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(DeleteResult::Success)
    }
}
