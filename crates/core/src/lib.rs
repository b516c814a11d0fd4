//! Daylock core data models.
//!
//! This crate defines the routine workflow graph: tasks that must be proven
//! done, the system controls ("gates") they hold locked, and the pure
//! structural operations over them.

#![warn(missing_docs)]

// Identities
mod id;

// Graph model
mod node;
mod edge;
mod schedule;
mod nullable;
mod workflow;
mod graph;
mod error;

// Seed data
mod defaults;

// Re-exports
pub use id::*;

pub use node::{Node, NodeKind, NodeCard, Position, StartData, TaskData, ControlData, LockType};
pub use edge::{Edge, Direction};
pub use nullable::Nullable;
pub use schedule::{Schedule, ClockTime, DayIndex, DAYS, day_name, weekday_index};
pub use workflow::{Workflow, WorkflowUpdate, WorkflowFilter};
pub use graph::{WorkflowGraph, IntegrityWarning};
pub use error::GraphError;
pub use defaults::starter_graph;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
