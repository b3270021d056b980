//! Hierarchical key index for stores without native wildcard deletion.
//!
//! Keys are split on the separator and stored as paths in a prefix tree.
//! A node carries a `value` (the full user key) only when an entry ends there:
//!
//! ```text
//! root
//!  ├─ a
//!  │  └─ b            value = "a:b"
//!  │     ├─ c         value = "a:b:c"
//!  │     └─ d         value = "a:b:d"
//!  └─ d
//!     └─ e
//!        └─ r         value = "d:e:r"
//! ```
//!
//! In memory the tree is an arena of nodes addressed by [`NodeId`]. It is
//! persisted as a single JSON document listing every stored key with its
//! path, in path order:
//!
//! ```text
//! {"entries":[{"path":["a","b"],"value":"a:b"},{"path":["a","b","c"],"value":"a:b:c"}]}
//! ```
//!
//! Interior nodes are implied by the paths, so the document stays flat no
//! matter how deep a key goes. Detached subtrees stay in the arena until the
//! next round trip through [`KeyIndex::to_document`], which only walks
//! reachable nodes.

use crate::error::{Error, Result};
use crate::key::KeyPattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index of a node in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

const ROOT: NodeId = NodeId(0);

#[derive(Clone, Debug, Default)]
struct Node {
    value: Option<String>,
    children: BTreeMap<String, NodeId>,
}

/// One stored key and the segment path it lives under.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub path: Vec<String>,
    pub value: String,
}

/// Serialized form of the tree: every node carrying a value, in path order.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct IndexDocument {
    #[serde(default)]
    pub entries: Vec<IndexEntry>,
}

/// Prefix tree over key segments.
#[derive(Clone, Debug)]
pub struct KeyIndex {
    nodes: Vec<Node>,
}

impl Default for KeyIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyIndex {
    /// Create an empty index holding only the root.
    pub fn new() -> Self {
        KeyIndex {
            nodes: vec![Node::default()],
        }
    }

    /// Record `key`, stored under the path `segments`.
    ///
    /// Missing intermediate nodes are created; existing siblings and
    /// descendants are left untouched.
    ///
    /// # Example
    ///
    /// ```
    /// use cachegate::index::KeyIndex;
    ///
    /// let mut index = KeyIndex::new();
    /// index.insert(&["a", "b", "c"], "a:b:c");
    /// index.insert(&["a", "b"], "a:b");
    ///
    /// assert_eq!(index.find_exact(&["a", "b"]), Some("a:b"));
    /// assert_eq!(index.len(), 2);
    /// ```
    pub fn insert<S: AsRef<str>>(&mut self, segments: &[S], key: &str) {
        let mut current = ROOT;
        for segment in segments {
            current = self.child_or_insert(current, segment.as_ref());
        }
        if current != ROOT {
            self.nodes[current.0].value = Some(key.to_string());
        }
    }

    /// Value stored exactly at `segments`.
    ///
    /// A node that exists only as an ancestor of other keys is not a match.
    pub fn find_exact<S: AsRef<str>>(&self, segments: &[S]) -> Option<&str> {
        let node = self.walk(segments)?;
        if node == ROOT {
            return None;
        }
        self.nodes[node.0].value.as_deref()
    }

    /// Every value stored at `segments` or anywhere below it.
    ///
    /// A missing path yields an empty list.
    pub fn find_below<S: AsRef<str>>(&self, segments: &[S]) -> Vec<String> {
        match self.walk(segments) {
            Some(node) => self.collect_values(node),
            None => Vec::new(),
        }
    }

    /// Resolve a delete pattern to the user keys it covers.
    pub fn find(&self, pattern: &KeyPattern) -> Vec<String> {
        match pattern {
            KeyPattern::Exact(path) => self
                .find_exact(path)
                .map(|key| vec![key.to_string()])
                .unwrap_or_default(),
            KeyPattern::Wildcard(path) => self.find_below(path),
        }
    }

    /// Apply a delete pattern to the tree.
    ///
    /// A wildcard detaches the whole subtree at its path (`*` alone clears
    /// the index). An exact pattern clears that node's value and prunes the
    /// node, plus any ancestors left empty, when it has no descendants.
    /// Descendant keys of an exact pattern keep their entries, so they stay
    /// indexed. Paths that do not exist are ignored.
    pub fn remove(&mut self, pattern: &KeyPattern) {
        match pattern {
            KeyPattern::Wildcard(path) if path.is_empty() => {
                self.nodes[ROOT.0].children.clear();
            }
            KeyPattern::Wildcard(path) => {
                if let Some(trail) = self.trail(path) {
                    let (parent, _) = trail[trail.len() - 2];
                    if let Some(segment) = path.last() {
                        self.nodes[parent.0].children.remove(segment);
                    }
                }
            }
            KeyPattern::Exact(path) => {
                if path.is_empty() {
                    return;
                }
                if let Some(trail) = self.trail(path) {
                    let (target, _) = trail[trail.len() - 1];
                    self.nodes[target.0].value = None;
                    self.prune(&trail, path);
                }
            }
        }
    }

    /// Number of keys recorded in the reachable tree.
    pub fn len(&self) -> usize {
        self.collect_values(ROOT).len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[ROOT.0].children.is_empty()
    }

    /// Convert to the persisted form.
    pub fn to_document(&self) -> IndexDocument {
        let mut entries = Vec::new();
        let mut path: Vec<&str> = Vec::new();
        // (node, depth, segment leading to it)
        let mut stack: Vec<(NodeId, usize, &str)> = self.nodes[ROOT.0]
            .children
            .iter()
            .rev()
            .map(|(segment, &child)| (child, 1, segment.as_str()))
            .collect();

        while let Some((id, depth, segment)) = stack.pop() {
            path.truncate(depth - 1);
            path.push(segment);

            let node = &self.nodes[id.0];
            if let Some(value) = &node.value {
                entries.push(IndexEntry {
                    path: path.iter().map(|s| s.to_string()).collect(),
                    value: value.clone(),
                });
            }
            stack.extend(
                node.children
                    .iter()
                    .rev()
                    .map(|(segment, &child)| (child, depth + 1, segment.as_str())),
            );
        }

        IndexDocument { entries }
    }

    /// Rebuild an arena from the persisted form.
    pub fn from_document(document: &IndexDocument) -> Self {
        let mut index = KeyIndex::new();
        for entry in &document.entries {
            index.insert(&entry.path, &entry.value);
        }
        index
    }

    /// Serialize the reachable tree as JSON.
    ///
    /// # Errors
    /// Returns `Error::SerializationError` if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.to_document())
            .map_err(|e| Error::SerializationError(format!("key index: {}", e)))
    }

    /// Parse a persisted index document.
    ///
    /// # Errors
    /// Returns `Error::DeserializationError` if the bytes are not an index document.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let document: IndexDocument = serde_json::from_slice(bytes)
            .map_err(|e| Error::DeserializationError(format!("key index: {}", e)))?;
        Ok(Self::from_document(&document))
    }

    fn child_or_insert(&mut self, parent: NodeId, segment: &str) -> NodeId {
        if let Some(&child) = self.nodes[parent.0].children.get(segment) {
            return child;
        }
        let child = NodeId(self.nodes.len());
        self.nodes.push(Node::default());
        self.nodes[parent.0]
            .children
            .insert(segment.to_string(), child);
        child
    }

    fn walk<S: AsRef<str>>(&self, segments: &[S]) -> Option<NodeId> {
        let mut current = ROOT;
        for segment in segments {
            current = *self.nodes[current.0].children.get(segment.as_ref())?;
        }
        Some(current)
    }

    /// Nodes visited from the root to the end of `segments`, root included.
    /// Each entry pairs the node with its depth.
    fn trail<S: AsRef<str>>(&self, segments: &[S]) -> Option<Vec<(NodeId, usize)>> {
        let mut trail = Vec::with_capacity(segments.len() + 1);
        let mut current = ROOT;
        trail.push((current, 0));
        for (depth, segment) in segments.iter().enumerate() {
            current = *self.nodes[current.0].children.get(segment.as_ref())?;
            trail.push((current, depth + 1));
        }
        Some(trail)
    }

    fn prune<S: AsRef<str>>(&mut self, trail: &[(NodeId, usize)], segments: &[S]) {
        for window in trail.windows(2).rev() {
            let (parent, _) = window[0];
            let (node, depth) = window[1];
            let n = &self.nodes[node.0];
            if n.value.is_some() || !n.children.is_empty() {
                break;
            }
            self.nodes[parent.0]
                .children
                .remove(segments[depth - 1].as_ref());
        }
    }

    fn collect_values(&self, start: NodeId) -> Vec<String> {
        let mut values = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if let Some(value) = &node.value {
                values.push(value.clone());
            }
            stack.extend(node.children.values().rev().copied());
        }
        values
    }
}
