//! Read APIs over a built call tree
//!
//! All lookups are full traversals driven by explicit work lists; tree size is
//! bounded by log length, so no incremental index is kept.

use crate::models::{CallTree, CallTreeNode, NodeId};
use serde::Deserialize;

/// Filter options for [`CallTree::filter`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TreeFilter {
    /// Node types to keep; empty keeps all
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(rename = "errorsOnly", default)]
    pub errors_only: bool,
    #[serde(rename = "minDuration", default)]
    pub min_duration: Option<u64>,
    #[serde(rename = "maxDepth", default)]
    pub max_depth: Option<u32>,
}

impl CallTree {
    /// Look up a node by id
    pub fn get_node(&self, id: NodeId) -> Option<&CallTreeNode> {
        self.nodes.get(id)
    }

    /// Case-insensitive substring search over node name and type, in preorder
    pub fn search(&self, needle: &str) -> Vec<&CallTreeNode> {
        let needle = needle.to_lowercase();
        let mut hits = Vec::new();
        for node in self.preorder() {
            if node.name.to_lowercase().contains(&needle)
                || node.node_type.to_lowercase().contains(&needle)
            {
                hits.push(node);
            }
        }
        hits
    }

    /// Nodes passing every supplied filter criterion, in preorder
    pub fn filter(&self, filter: &TreeFilter) -> Vec<&CallTreeNode> {
        self.preorder()
            .into_iter()
            .filter(|node| {
                if !filter.types.is_empty() && !filter.types.iter().any(|t| *t == node.node_type) {
                    return false;
                }
                if filter.errors_only && !node.has_error {
                    return false;
                }
                if let Some(min) = filter.min_duration
                    && node.duration < min
                {
                    return false;
                }
                if let Some(max) = filter.max_depth
                    && node.depth > max
                {
                    return false;
                }
                true
            })
            .collect()
    }

    /// Root-to-node ancestry for a node id, walking parent back-references
    pub fn node_path(&self, id: NodeId) -> Option<Vec<NodeId>> {
        let mut path = vec![self.nodes.get(id)?.id];
        let mut current = id;
        while let Some(parent) = self.nodes.get(current).and_then(|n| n.parent) {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        Some(path)
    }

    /// Preorder walk with an explicit work list; safe for pathologically deep
    /// trees where native recursion would overflow the stack
    fn preorder(&self) -> Vec<&CallTreeNode> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut work: Vec<NodeId> = vec![self.root];
        while let Some(id) = work.pop() {
            let Some(node) = self.nodes.get(id) else { continue };
            out.push(node);
            // push in reverse so children come off the list in insertion order
            for &child in node.children.iter().rev() {
                work.push(child);
            }
        }
        out
    }
}
