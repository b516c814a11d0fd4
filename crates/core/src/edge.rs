//! Directed dependency edges.

use serde::{Deserialize, Serialize};

use crate::id::{EdgeId, NodeId};

/// A directed edge. For gates the convention is `source` = task,
/// `target` = gate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Unique identifier
    pub id: EdgeId,

    /// Upstream node
    pub source: NodeId,

    /// Downstream node
    pub target: NodeId,
}

impl Edge {
    /// Create an edge with a generated id.
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: EdgeId::new(),
            source: source.into(),
            target: target.into(),
        }
    }

    /// Replace the generated id.
    pub fn with_id(mut self, id: impl Into<EdgeId>) -> Self {
        self.id = id.into();
        self
    }

    /// Whether either endpoint is `node`.
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }
}

/// Which edges to select relative to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Edges ending at the node
    Incoming,
    /// Edges starting at the node
    Outgoing,
    /// Edges with the node at either end
    Either,
}

impl Direction {
    /// Whether `edge` is selected for `node` in this direction.
    pub fn matches(self, edge: &Edge, node: &NodeId) -> bool {
        match self {
            Direction::Incoming => &edge.target == node,
            Direction::Outgoing => &edge.source == node,
            Direction::Either => edge.touches(node),
        }
    }
}
