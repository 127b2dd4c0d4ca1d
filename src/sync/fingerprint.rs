//! Fingerprint maps and change detection.
//!
//! A fingerprint map flattens a tree into `path -> content identity`. Two
//! snapshots are considered equivalent exactly when their maps hold the same
//! key/value pairs; the maps are never diffed structurally, so a rename shows
//! up as one removed key plus one added key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::backend::VersionToken;
use crate::sync::node::Node;

/// Mapping from every node's path to its content identity.
///
/// Ordered so that equal maps serialize to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintMap(BTreeMap<String, VersionToken>);

impl FingerprintMap {
    /// Build the map for a tree.
    ///
    /// Every node contributes one entry, the root included (under `""`).
    /// Nodes without a content identity map to the empty string.
    pub fn build(tree: &Node) -> Self {
        let mut map = BTreeMap::new();
        tree.walk(&mut |node| {
            let identity = node.content_identity().cloned().unwrap_or_default();
            map.insert(node.path().to_string(), identity);
        });
        Self(map)
    }

    pub fn get(&self, path: &str) -> Option<&VersionToken> {
        self.0.get(path)
    }

    pub fn contains_key(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VersionToken)> {
        self.0.iter()
    }
}

impl FromIterator<(String, VersionToken)> for FingerprintMap {
    fn from_iter<I: IntoIterator<Item = (String, VersionToken)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Report whether `current` differs from `previous`.
///
/// An absent `previous` (nothing observed yet) always counts as a change.
pub fn changed(previous: Option<&FingerprintMap>, current: &FingerprintMap) -> bool {
    match previous {
        None => true,
        Some(previous) => previous != current,
    }
}
