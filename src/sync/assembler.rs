use std::sync::Arc;

use crate::backend::ContentBackend;
use crate::sync::error::Result;
use crate::sync::node::Snapshot;
use crate::sync::tree_reader::TreeReader;

/// Produces complete snapshots of the remote repository.
///
/// Every call re-reads the whole remote tree; nothing is cached here. Callers
/// decide how often that cost is worth paying.
#[derive(Clone)]
pub struct SnapshotAssembler {
    reader: TreeReader,
}

impl SnapshotAssembler {
    pub fn new(backend: Arc<dyn ContentBackend>) -> Self {
        Self {
            reader: TreeReader::new(backend),
        }
    }

    /// Read the whole tree and derive its fingerprints.
    pub async fn assemble(&self) -> Result<Snapshot> {
        let tree = self.reader.read("").await?;
        Ok(Snapshot::new(tree))
    }
}
