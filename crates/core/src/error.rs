use crate::id::{EdgeId, NodeId};

/// Structural errors raised by graph mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A node with this id already exists
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// An edge with this id already exists
    #[error("duplicate edge id: {0}")]
    DuplicateEdge(EdgeId),

    /// Referenced node is not in the workflow
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Edge endpoint is not in the workflow
    #[error("edge {edge} references unknown node {node}")]
    DanglingEdge {
        /// The rejected edge
        edge: EdgeId,
        /// The missing endpoint
        node: NodeId,
    },

    /// Replacement node carries a different id than the slot it replaces
    #[error("replacement for node {expected} carries id {actual}")]
    IdMismatch {
        /// Id of the slot being replaced
        expected: NodeId,
        /// Id carried by the replacement
        actual: NodeId,
    },

    /// Not a valid `HH:MM` time
    #[error("invalid clock time: {0}")]
    InvalidClockTime(String),
}
