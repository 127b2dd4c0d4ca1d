//! Materializing the remote tree.
//!
//! Each directory's entries are read concurrently and joined back in listing
//! order, so the assembled tree's shape never depends on which remote call
//! finished first.

use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use tracing::warn;

use crate::backend::{
    base_name, normalize_path, ContentBackend, EntryKind, RemoteEntry, VersionToken,
};
use crate::sync::content::decode_content;
use crate::sync::error::{Result, SyncError};
use crate::sync::node::{DirectoryNode, FileNode, Node};

/// Reads a directory and everything beneath it from the remote store.
#[derive(Clone)]
pub struct TreeReader {
    backend: Arc<dyn ContentBackend>,
}

impl TreeReader {
    pub fn new(backend: Arc<dyn ContentBackend>) -> Self {
        Self { backend }
    }

    /// Read the tree rooted at `path` (`""` for the repository root).
    ///
    /// Fails with `SyncError::RemoteList` if any directory in the tree cannot be
    /// listed. A file whose content cannot be fetched still appears, with
    /// `content: None` and the failure recorded in `error`.
    pub async fn read(&self, path: &str) -> Result<Node> {
        let path = normalize_path(path);
        let name = base_name(&path).to_string();
        self.read_directory(path, name, None).await
    }

    fn read_directory(
        &self,
        path: String,
        name: String,
        content_identity: Option<VersionToken>,
    ) -> BoxFuture<'_, Result<Node>> {
        async move {
            let entries = self
                .backend
                .list(&path)
                .await
                .map_err(|source| SyncError::RemoteList {
                    path: path.clone(),
                    source,
                })?;

            let children =
                try_join_all(entries.into_iter().map(|entry| self.read_entry(entry))).await?;

            Ok(Node::Directory(DirectoryNode {
                name,
                path,
                content_identity,
                children,
            }))
        }
        .boxed()
    }

    async fn read_entry(&self, entry: RemoteEntry) -> Result<Node> {
        match entry.kind {
            EntryKind::Directory => {
                self.read_directory(entry.path, entry.name, Some(entry.version_token))
                    .await
            }
            EntryKind::File => Ok(self.read_file(entry).await),
        }
    }

    async fn read_file(&self, entry: RemoteEntry) -> Node {
        let (content, error) = match self.backend.fetch_content(&entry.path).await {
            Ok(bytes) => (Some(decode_content(&entry.name, &bytes)), None),
            Err(e) => {
                warn!(path = %entry.path, error = %e, "failed to fetch file content");
                (None, Some(e.to_string()))
            }
        };

        Node::File(FileNode {
            name: entry.name,
            path: entry.path,
            content_identity: Some(entry.version_token),
            content,
            size: entry.size,
            source_url: entry.source_url,
            error,
        })
    }
}
