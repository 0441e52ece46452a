//! The fixed room tree.
//!
//! Every node with children is zoomable: double-clicking its box opens the
//! room that holds its children. The tree is supplied once per session and
//! never mutated; edges run from parent to child.

use crate::id::NodeId;
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A node as supplied by the room-tree collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    /// Single letter, or empty for structural nodes.
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn leaf(id: &str, label: &str) -> Self {
        Self {
            id: NodeId::intern(id),
            label: label.to_string(),
            children: Vec::new(),
        }
    }

    pub fn branch(id: &str, label: &str, children: Vec<NodeSpec>) -> Self {
        Self {
            id: NodeId::intern(id),
            label: label.to_string(),
            children,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: NodeId,
    pub label: String,
}

/// Indexed, immutable view of the room tree.
#[derive(Debug, Clone)]
pub struct NodeTree {
    graph: StableDiGraph<TreeNode, ()>,
    root: NodeIndex,
    id_index: HashMap<NodeId, NodeIndex>,
}

impl NodeTree {
    /// Build the tree from its root spec.
    ///
    /// # Errors
    /// Returns a message naming the first id that appears twice.
    pub fn new(spec: &NodeSpec) -> Result<Self, String> {
        let mut graph = StableDiGraph::new();
        let mut id_index = HashMap::new();
        let root = graph.add_node(TreeNode {
            id: spec.id,
            label: spec.label.clone(),
        });
        id_index.insert(spec.id, root);

        let mut pending: Vec<(NodeIndex, &NodeSpec)> = vec![(root, spec)];
        while let Some((parent, parent_spec)) = pending.pop() {
            for child in &parent_spec.children {
                if id_index.contains_key(&child.id) {
                    log::warn!("room tree rejected: duplicate id {}", child.id);
                    return Err(format!("Duplicate node id \"{}\" in room tree", child.id));
                }
                let idx = graph.add_node(TreeNode {
                    id: child.id,
                    label: child.label.clone(),
                });
                graph.add_edge(parent, idx, ());
                id_index.insert(child.id, idx);
                pending.push((idx, child));
            }
        }

        Ok(Self {
            graph,
            root,
            id_index,
        })
    }

    /// Parse a JSON `NodeSpec` document and index it.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let spec: NodeSpec =
            serde_json::from_str(json).map_err(|e| format!("Invalid room tree JSON: {e}"))?;
        Self::new(&spec)
    }

    pub fn root_id(&self) -> NodeId {
        self.graph[self.root].id
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.id_index.get(&id).map(|idx| &self.graph[*idx])
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.id_index.contains_key(&id)
    }

    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.get(id).map(|n| n.label.as_str())
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        let idx = *self.id_index.get(&id)?;
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .next()
            .map(|p| self.graph[p].id)
    }

    /// Children in declaration order.
    pub fn children_of(&self, id: NodeId) -> Vec<&TreeNode> {
        let Some(&idx) = self.id_index.get(&id) else {
            return Vec::new();
        };
        // Indices are allocated in insertion order; sorting restores it
        // regardless of adjacency-list iteration order.
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        children.sort();
        children.into_iter().map(|c| &self.graph[c]).collect()
    }

    pub fn is_zoomable(&self, id: NodeId) -> bool {
        self.id_index.get(&id).is_some_and(|idx| {
            self.graph
                .neighbors_directed(*idx, Direction::Outgoing)
                .next()
                .is_some()
        })
    }
}
