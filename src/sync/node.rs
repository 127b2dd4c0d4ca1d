//! The mirrored tree and the snapshot that pairs it with its fingerprints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::VersionToken;
use crate::sync::fingerprint::FingerprintMap;

/// A directory in the mirrored tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryNode {
    pub name: String,
    /// Slash-separated path from the repository root; the root is `""`.
    pub path: String,
    /// Absent for the synthetic root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_identity: Option<VersionToken>,
    /// Children in the order the remote store listed them.
    pub children: Vec<Node>,
}

/// A file in the mirrored tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_identity: Option<VersionToken>,
    /// Decoded text, or a structured value for recognised formats.
    /// `None` (serialized as `null`) when the content could not be fetched.
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Why the content is missing, if it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A node of the mirrored tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Directory(DirectoryNode),
    File(FileNode),
}

impl Node {
    /// Get the base name of this node.
    pub fn name(&self) -> &str {
        match self {
            Node::Directory(d) => &d.name,
            Node::File(f) => &f.name,
        }
    }

    /// Get the path of this node from the repository root.
    pub fn path(&self) -> &str {
        match self {
            Node::Directory(d) => &d.path,
            Node::File(f) => &f.path,
        }
    }

    /// Get the remote store's content identity for this node.
    pub fn content_identity(&self) -> Option<&VersionToken> {
        match self {
            Node::Directory(d) => d.content_identity.as_ref(),
            Node::File(f) => f.content_identity.as_ref(),
        }
    }

    /// Children of a directory; files have none.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Directory(d) => &d.children,
            Node::File(_) => &[],
        }
    }

    /// Find a node by path in this subtree.
    pub fn find(&self, path: &str) -> Option<&Node> {
        if self.path() == path {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(path))
    }

    /// Visit this node and all of its descendants, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}

/// One consistent `{tree, fingerprints}` pair produced by a single full read.
///
/// Snapshots are never modified; each poll cycle or mutation produces a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tree: Node,
    pub fingerprints: FingerprintMap,
}

impl Snapshot {
    /// Pair a tree with the fingerprints derived from it.
    pub fn new(tree: Node) -> Self {
        let fingerprints = FingerprintMap::build(&tree);
        Self { tree, fingerprints }
    }

    /// The serialized form sent to subscribers.
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn file(path: &str, token: &str, content: &str) -> Node {
        Node::File(FileNode {
            name: crate::backend::base_name(path).to_string(),
            path: path.to_string(),
            content_identity: Some(token.to_string()),
            content: Some(Value::String(content.to_string())),
            size: Some(content.len() as u64),
            source_url: None,
            error: None,
        })
    }

    pub(crate) fn dir(path: &str, token: Option<&str>, children: Vec<Node>) -> Node {
        Node::Directory(DirectoryNode {
            name: crate::backend::base_name(path).to_string(),
            path: path.to_string(),
            content_identity: token.map(str::to_string),
            children,
        })
    }

    #[test]
    fn test_serialization_shape() {
        let tree = dir(
            "",
            None,
            vec![dir("docs", Some("d1"), vec![file("docs/a.txt", "f1", "hello")])],
        );

        let value = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "directory",
                "name": "",
                "path": "",
                "children": [{
                    "type": "directory",
                    "name": "docs",
                    "path": "docs",
                    "contentIdentity": "d1",
                    "children": [{
                        "type": "file",
                        "name": "a.txt",
                        "path": "docs/a.txt",
                        "contentIdentity": "f1",
                        "content": "hello",
                        "size": 5
                    }]
                }]
            })
        );
    }

    #[test]
    fn test_failed_file_serializes_null_content() {
        let node = Node::File(FileNode {
            name: "x.bin".to_string(),
            path: "x.bin".to_string(),
            content_identity: Some("t".to_string()),
            content: None,
            size: None,
            source_url: None,
            error: Some("boom".to_string()),
        });

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "file");
        assert!(value["content"].is_null());
        assert_eq!(value["error"], "boom");
    }

    #[test]
    fn test_find_and_walk() {
        let tree = dir(
            "",
            None,
            vec![
                file("a.txt", "1", "a"),
                dir("docs", Some("2"), vec![file("docs/b.txt", "3", "b")]),
            ],
        );

        assert_eq!(tree.find("docs/b.txt").map(Node::name), Some("b.txt"));
        assert!(tree.find("nope").is_none());

        let mut paths = Vec::new();
        tree.walk(&mut |node| paths.push(node.path()));
        assert_eq!(paths, vec!["", "a.txt", "docs", "docs/b.txt"]);
    }

    #[test]
    fn test_snapshot_roundtrip_through_payload() {
        let snapshot = Snapshot::new(dir("", None, vec![file("a.json", "1", "x")]));
        let payload = snapshot.to_payload().unwrap();
        let parsed: Snapshot = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
