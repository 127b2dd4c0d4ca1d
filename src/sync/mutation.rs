//! Create, update, delete and move against the remote store.
//!
//! Every mutation that reaches the remote store is followed by a forced
//! resnapshot: the cache is replaced and the new snapshot broadcast without
//! asking the differ. A move is a save followed by a remove and is not atomic;
//! if the remove fails the content exists at both paths and the error is
//! returned to the caller.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::backend::{
    normalize_path, BackendError, ContentBackend, DeleteResult, VersionToken, WriteResult,
};
use crate::sync::context::SyncContext;
use crate::sync::error::{Result, SyncError};
use crate::sync::node::Snapshot;

/// The result of a successful mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    /// The path that was written or removed (the destination, for a move).
    pub path: String,
    /// The source path, for a move.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
    /// The new version token of a written path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_token: Option<VersionToken>,
    /// The snapshot published after the mutation, if it could be assembled.
    #[serde(skip)]
    pub snapshot: Option<Arc<Snapshot>>,
}

pub struct MutationCoordinator {
    backend: Arc<dyn ContentBackend>,
    context: Arc<SyncContext>,
}

impl MutationCoordinator {
    pub fn new(backend: Arc<dyn ContentBackend>, context: Arc<SyncContext>) -> Self {
        Self { backend, context }
    }

    /// Create or update `path` with `content`.
    ///
    /// The current version token is read first and sent as the write's
    /// precondition. If another writer changed the path in between, this fails
    /// with `SyncError::RemoteWriteConflict` and nothing is retried.
    pub async fn save(&self, path: &str, content: &[u8], message: &str) -> Result<MutationOutcome> {
        let path = require_path(path)?;
        let token = self.save_inner(&path, content, message).await?;
        info!(path = %path, "saved");

        Ok(MutationOutcome {
            snapshot: self.publish().await,
            path,
            previous_path: None,
            version_token: Some(token),
        })
    }

    /// Delete `path`, which must currently exist.
    pub async fn remove(&self, path: &str, message: &str) -> Result<MutationOutcome> {
        let path = require_path(path)?;
        self.remove_inner(&path, message).await?;
        info!(path = %path, "removed");

        Ok(MutationOutcome {
            snapshot: self.publish().await,
            path,
            previous_path: None,
            version_token: None,
        })
    }

    /// Move `old_path` to `new_path` by saving a copy and removing the original.
    pub async fn move_path(
        &self,
        old_path: &str,
        new_path: &str,
        message: &str,
    ) -> Result<MutationOutcome> {
        let old_path = require_path(old_path)?;
        let new_path = require_path(new_path)?;
        if old_path == new_path {
            return Err(SyncError::InvalidRequest(format!(
                "cannot move '{}' onto itself",
                old_path
            )));
        }

        if self.backend.get_version_token(&old_path).await?.is_none() {
            return Err(SyncError::NotFound(old_path));
        }
        let content = self
            .backend
            .fetch_content(&old_path)
            .await
            .map_err(|e| not_found_or(e, &old_path))?;

        let token = self.save_inner(&new_path, &content, message).await?;
        if let Err(e) = self.remove_inner(&old_path, message).await {
            error!(
                from = %old_path,
                to = %new_path,
                error = %e,
                "move copied content but failed to remove the source; both paths now exist"
            );
            self.publish().await;
            return Err(e);
        }
        info!(from = %old_path, to = %new_path, "moved");

        Ok(MutationOutcome {
            snapshot: self.publish().await,
            path: new_path,
            previous_path: Some(old_path),
            version_token: Some(token),
        })
    }

    async fn save_inner(&self, path: &str, content: &[u8], message: &str) -> Result<VersionToken> {
        let expected = self.backend.get_version_token(path).await?;
        match self
            .backend
            .write(path, content, expected.as_ref(), message)
            .await?
        {
            WriteResult::Success(token) => Ok(token),
            WriteResult::Mismatch(current) => {
                warn!(path, expected = ?expected, current = ?current, "write rejected");
                Err(SyncError::RemoteWriteConflict(path.to_string()))
            }
        }
    }

    async fn remove_inner(&self, path: &str, message: &str) -> Result<()> {
        let Some(token) = self.backend.get_version_token(path).await? else {
            return Err(SyncError::NotFound(path.to_string()));
        };
        match self
            .backend
            .delete(path, &token, message)
            .await
            .map_err(|e| not_found_or(e, path))?
        {
            DeleteResult::Success => Ok(()),
            DeleteResult::Mismatch(current) => {
                warn!(path, expected = %token, current = ?current, "delete rejected");
                Err(SyncError::RemoteWriteConflict(path.to_string()))
            }
        }
    }

    /// Resnapshot after a committed mutation. The mutation already happened, so
    /// a failure here is logged rather than returned; the next poll catches up.
    async fn publish(&self) -> Option<Arc<Snapshot>> {
        match self.context.force_refresh().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "failed to resnapshot after mutation");
                None
            }
        }
    }
}

fn require_path(path: &str) -> Result<String> {
    let path = normalize_path(path);
    if path.is_empty() {
        return Err(SyncError::InvalidRequest("path is required".to_string()));
    }
    Ok(path)
}

fn not_found_or(e: BackendError, path: &str) -> SyncError {
    match e {
        BackendError::NotFound => SyncError::NotFound(path.to_string()),
        other => SyncError::Backend(other),
    }
}
