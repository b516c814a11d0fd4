//! Gate lock derivation.
//!
//! A gate's dependencies are the task nodes on the source side of its
//! incoming edges (`source = task`, `target = gate`). Edges pointing the
//! other way are not dependencies.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use daylock_core::{Direction, Node, NodeId, TaskData, WorkflowGraph};

/// Derived state of one gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateState {
    /// Whether any dependency currently demands the lock
    pub locked: bool,
    /// Tasks that are inside their window and not yet validated
    pub blocking: Vec<NodeId>,
}

/// Derives gate lock states from a graph and a wall-clock instant.
///
/// Pure: no I/O, no interior state. Calling it twice with the same inputs
/// gives the same answer.
pub struct DependencyLockEngine;

impl DependencyLockEngine {
    /// Create a new engine.
    pub fn new() -> Self {
        Self
    }

    /// Whether the task's schedule applies at `now`.
    ///
    /// Unscheduled tasks are never active and so never hold a gate locked.
    pub fn active_now(task: &TaskData, now: NaiveDateTime) -> bool {
        task.schedule.as_ref().is_some_and(|s| s.contains(now))
    }

    /// Whether the task currently demands a lock on its gates.
    pub fn needs_lock(task: &TaskData, now: NaiveDateTime) -> bool {
        Self::active_now(task, now) && !task.validated
    }

    /// Task nodes feeding `gate`. Edges to missing nodes are skipped.
    pub fn dependency_tasks<'a>(&self, graph: &'a WorkflowGraph, gate: &NodeId) -> Vec<&'a Node> {
        let mut tasks: Vec<&Node> = Vec::new();
        for edge in graph.edges_touching(gate, Direction::Incoming) {
            let Some(node) = graph.find_node(&edge.source) else {
                continue;
            };
            // parallel edges from one task count once
            if node.as_task().is_some() && !tasks.iter().any(|t| t.id == node.id) {
                tasks.push(node);
            }
        }
        tasks
    }

    /// Full per-gate evaluation, including which tasks block each gate.
    pub fn evaluate(&self, graph: &WorkflowGraph, now: NaiveDateTime) -> BTreeMap<NodeId, GateState> {
        graph
            .gates()
            .map(|gate| {
                let blocking: Vec<NodeId> = self
                    .dependency_tasks(graph, &gate.id)
                    .into_iter()
                    .filter(|n| n.as_task().is_some_and(|t| Self::needs_lock(t, now)))
                    .map(|n| n.id.clone())
                    .collect();
                let state = GateState {
                    locked: !blocking.is_empty(),
                    blocking,
                };
                (gate.id.clone(), state)
            })
            .collect()
    }

    /// Desired `is_locked` value for every gate in the graph.
    pub fn derive_lock_states(&self, graph: &WorkflowGraph, now: NaiveDateTime) -> BTreeMap<NodeId, bool> {
        self.evaluate(graph, now)
            .into_iter()
            .map(|(id, state)| (id, state.locked))
            .collect()
    }
}

impl Default for DependencyLockEngine {
    fn default() -> Self {
        Self::new()
    }
}
