//! Starter graph for a fresh day.

use crate::edge::Edge;
use crate::node::{LockType, Node, NodeCard, Position};

/// The stock morning routine: a start node, two tasks, and an `apps` gate
/// that depends on both tasks.
pub fn starter_graph() -> (Vec<Node>, Vec<Edge>) {
    let start = Node::start(NodeCard::new("Morning", "Your day starts here").with_icon("sun"))
        .at(Position::new(0.0, 0.0));
    let wash = Node::task(
        NodeCard::new("Wash Face", "Start your day fresh by washing your face").with_icon("face"),
        None,
    )
    .at(Position::new(250.0, -80.0));
    let meds = Node::task(
        NodeCard::new("Take Medication", "Remember to take your daily medication")
            .with_icon("pill"),
        None,
    )
    .at(Position::new(250.0, 80.0));
    let apps = Node::control(
        NodeCard::new("Apps", "Unlocks once the morning tasks are done").with_icon("lock"),
        LockType::Apps,
    )
    .at(Position::new(500.0, 0.0));

    let edges = vec![
        Edge::new(start.id.clone(), wash.id.clone()),
        Edge::new(start.id.clone(), meds.id.clone()),
        Edge::new(wash.id.clone(), apps.id.clone()),
        Edge::new(meds.id.clone(), apps.id.clone()),
    ];

    (vec![start, wash, meds, apps], edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::WorkflowGraph;

    #[test]
    fn starter_graph_is_consistent() {
        let (nodes, edges) = starter_graph();
        let (graph, warnings) = WorkflowGraph::load(nodes, edges);
        assert!(warnings.is_empty());
        assert_eq!(graph.tasks().count(), 2);
        assert_eq!(graph.gates().count(), 1);
    }
}
