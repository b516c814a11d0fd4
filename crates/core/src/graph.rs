//! In-memory structural access over one workflow's nodes and edges.
//!
//! Everything here is pure: no clock, no validation semantics, no I/O.
//! Callers persist the result and re-run the lock engine afterwards.

use std::collections::HashSet;

use crate::edge::{Direction, Edge};
use crate::error::GraphError;
use crate::id::{EdgeId, NodeId};
use crate::node::{Node, Position};
use crate::workflow::Workflow;

/// A data-integrity problem found while loading a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityWarning {
    /// Edge with at least one endpoint missing; dropped
    DanglingEdge {
        /// The dropped edge
        edge: EdgeId,
        /// The first missing endpoint
        missing: NodeId,
    },
    /// Second node with an id already seen; dropped
    DuplicateNode(NodeId),
    /// Second edge with an id already seen; dropped
    DuplicateEdge(EdgeId),
}

impl std::fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityWarning::DanglingEdge { edge, missing } => {
                write!(f, "edge {edge} references missing node {missing}")
            }
            IntegrityWarning::DuplicateNode(id) => write!(f, "duplicate node id {id}"),
            IntegrityWarning::DuplicateEdge(id) => write!(f, "duplicate edge id {id}"),
        }
    }
}

/// Nodes and edges of one loaded workflow.
///
/// Invariant: every edge's endpoints are present in `nodes`, and ids are
/// unique within each collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl WorkflowGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from raw collections, dropping anything that would
    /// break the invariant and reporting it.
    pub fn load(nodes: Vec<Node>, edges: Vec<Edge>) -> (Self, Vec<IntegrityWarning>) {
        let mut warnings = Vec::new();
        let mut node_ids = HashSet::new();
        let mut kept_nodes = Vec::with_capacity(nodes.len());

        for node in nodes {
            if node_ids.insert(node.id.clone()) {
                kept_nodes.push(node);
            } else {
                warnings.push(IntegrityWarning::DuplicateNode(node.id));
            }
        }

        let mut edge_ids = HashSet::new();
        let mut kept_edges = Vec::with_capacity(edges.len());

        for edge in edges {
            let missing = [&edge.source, &edge.target]
                .into_iter()
                .find(|id| !node_ids.contains(*id))
                .cloned();

            if let Some(missing) = missing {
                warnings.push(IntegrityWarning::DanglingEdge {
                    edge: edge.id,
                    missing,
                });
            } else if !edge_ids.insert(edge.id.clone()) {
                warnings.push(IntegrityWarning::DuplicateEdge(edge.id));
            } else {
                kept_edges.push(edge);
            }
        }

        (
            Self {
                nodes: kept_nodes,
                edges: kept_edges,
            },
            warnings,
        )
    }

    /// Build a graph from a workflow record.
    pub fn from_workflow(workflow: &Workflow) -> (Self, Vec<IntegrityWarning>) {
        Self::load(workflow.nodes.clone(), workflow.edges.clone())
    }

    /// All nodes in order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All edges in order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Consume the graph into its collections.
    pub fn into_parts(self) -> (Vec<Node>, Vec<Edge>) {
        (self.nodes, self.edges)
    }

    /// Look up a node.
    pub fn find_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Look up a node for in-place changes to its payload.
    pub fn find_node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    /// Look up an edge.
    pub fn find_edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| &e.id == id)
    }

    /// Edges touching `node` in the given direction.
    pub fn edges_touching(&self, node: &NodeId, direction: Direction) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| direction.matches(e, node))
            .collect()
    }

    /// All system control nodes.
    pub fn gates(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.as_control().is_some())
    }

    /// All verifiable task nodes.
    pub fn tasks(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.as_task().is_some())
    }

    /// Append a node.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.find_node(&node.id).is_some() {
            return Err(GraphError::DuplicateNode(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let index = self.nodes.iter().position(|n| &n.id == id)?;
        self.edges.retain(|e| !e.touches(id));
        Some(self.nodes.remove(index))
    }

    /// Append an edge; both endpoints must exist.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if self.find_edge(&edge.id).is_some() {
            return Err(GraphError::DuplicateEdge(edge.id));
        }
        for endpoint in [&edge.source, &edge.target] {
            if self.find_node(endpoint).is_none() {
                return Err(GraphError::DanglingEdge {
                    edge: edge.id.clone(),
                    node: endpoint.clone(),
                });
            }
        }
        self.edges.push(edge);
        Ok(())
    }

    /// Remove an edge.
    pub fn remove_edge(&mut self, id: &EdgeId) -> Option<Edge> {
        let index = self.edges.iter().position(|e| &e.id == id)?;
        Some(self.edges.remove(index))
    }

    /// Replace the node stored under `id`, keeping its slot in the order.
    /// Returns the previous node.
    pub fn replace_node(&mut self, id: &NodeId, node: Node) -> Result<Node, GraphError> {
        if &node.id != id {
            return Err(GraphError::IdMismatch {
                expected: id.clone(),
                actual: node.id,
            });
        }
        let slot = self
            .find_node_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
        Ok(std::mem::replace(slot, node))
    }

    /// Move a node in the editor layout.
    pub fn update_position(&mut self, id: &NodeId, position: Position) -> Result<(), GraphError> {
        let node = self
            .find_node_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
        node.position = position;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{LockType, NodeCard};

    fn task(id: &str) -> Node {
        Node::task(NodeCard::new(id, ""), None).with_id(id)
    }

    fn gate(id: &str) -> Node {
        Node::control(NodeCard::new(id, ""), LockType::Apps).with_id(id)
    }

    fn sample() -> WorkflowGraph {
        let mut graph = WorkflowGraph::new();
        graph.add_node(task("a")).unwrap();
        graph.add_node(task("b")).unwrap();
        graph.add_node(gate("g")).unwrap();
        graph.add_edge(Edge::new("a", "g").with_id("e1")).unwrap();
        graph.add_edge(Edge::new("b", "g").with_id("e2")).unwrap();
        graph
    }

    #[test]
    fn load_drops_dangling_edges() {
        let (graph, warnings) = WorkflowGraph::load(
            vec![task("a"), gate("g")],
            vec![
                Edge::new("a", "g").with_id("ok"),
                Edge::new("ghost", "g").with_id("bad"),
            ],
        );

        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.edges()[0].id, EdgeId::from("ok"));
        assert_eq!(
            warnings,
            vec![IntegrityWarning::DanglingEdge {
                edge: EdgeId::from("bad"),
                missing: NodeId::from("ghost"),
            }]
        );
    }

    #[test]
    fn load_drops_duplicate_ids() {
        let (graph, warnings) = WorkflowGraph::load(
            vec![task("a"), task("a"), gate("g")],
            vec![
                Edge::new("a", "g").with_id("e"),
                Edge::new("a", "g").with_id("e"),
            ],
        );

        assert_eq!(graph.nodes().len(), 2);
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn edges_touching_respects_direction() {
        let graph = sample();
        let g = NodeId::from("g");
        let a = NodeId::from("a");

        assert_eq!(graph.edges_touching(&g, Direction::Incoming).len(), 2);
        assert!(graph.edges_touching(&g, Direction::Outgoing).is_empty());
        assert_eq!(graph.edges_touching(&a, Direction::Outgoing).len(), 1);
        assert_eq!(graph.edges_touching(&a, Direction::Either).len(), 1);
    }

    #[test]
    fn remove_node_removes_touching_edges() {
        let mut graph = sample();
        let removed = graph.remove_node(&NodeId::from("a")).unwrap();

        assert_eq!(removed.id, NodeId::from("a"));
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.edges()[0].id, EdgeId::from("e2"));
        assert!(graph.remove_node(&NodeId::from("a")).is_none());
    }

    #[test]
    fn add_edge_rejects_unknown_endpoints() {
        let mut graph = sample();
        let err = graph.add_edge(Edge::new("a", "nowhere").with_id("e3")).unwrap_err();
        assert_eq!(
            err,
            GraphError::DanglingEdge {
                edge: EdgeId::from("e3"),
                node: NodeId::from("nowhere"),
            }
        );
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn add_rejects_duplicates() {
        let mut graph = sample();
        assert_eq!(
            graph.add_node(task("a")),
            Err(GraphError::DuplicateNode(NodeId::from("a")))
        );
        assert_eq!(
            graph.add_edge(Edge::new("b", "g").with_id("e1")),
            Err(GraphError::DuplicateEdge(EdgeId::from("e1")))
        );
    }

    #[test]
    fn replace_node_keeps_order_and_checks_id() {
        let mut graph = sample();
        let renamed = Node::task(NodeCard::new("renamed", ""), None).with_id("b");

        let old = graph.replace_node(&NodeId::from("b"), renamed).unwrap();
        assert_eq!(old.title(), "b");
        assert_eq!(graph.nodes()[1].title(), "renamed");

        let wrong = task("z");
        assert!(matches!(
            graph.replace_node(&NodeId::from("b"), wrong),
            Err(GraphError::IdMismatch { .. })
        ));
        assert!(matches!(
            graph.replace_node(&NodeId::from("z"), task("z")),
            Err(GraphError::NodeNotFound(_))
        ));
    }

    #[test]
    fn update_position_moves_only_layout() {
        let mut graph = sample();
        graph
            .update_position(&NodeId::from("g"), Position::new(5.0, 6.0))
            .unwrap();
        let node = graph.find_node(&NodeId::from("g")).unwrap();
        assert_eq!(node.position, Position::new(5.0, 6.0));
        assert!(node.as_control().is_some());
    }

    #[test]
    fn gates_and_tasks_partition_by_kind() {
        let graph = sample();
        assert_eq!(graph.gates().count(), 1);
        assert_eq!(graph.tasks().count(), 2);
    }
}
