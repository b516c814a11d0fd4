//! Workflow model - the unit of persistence.

use serde::{Deserialize, Serialize};

use crate::edge::Edge;
use crate::id::WorkflowId;
use crate::node::Node;
use crate::nullable::Nullable;
use crate::schedule::DayIndex;
use crate::Time;

/// A named graph of nodes and edges, either bound to a weekday or kept as a
/// template. Nodes and edges are embedded and share its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Unique identifier
    pub id: WorkflowId,

    /// Display name
    pub name: String,

    /// Templates have no day binding and seed day workflows
    #[serde(default)]
    pub is_template: bool,

    /// Weekday this workflow runs on (Monday = 0)
    #[serde(default, skip_serializing_if = "Nullable::is_absent")]
    pub day_of_week: Nullable<DayIndex>,

    /// Ordered nodes
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Ordered edges
    #[serde(default)]
    pub edges: Vec<Edge>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last mutation timestamp
    pub updated_at: Time,
}

impl Workflow {
    /// Create an empty workflow bound to `day`.
    pub fn new(name: impl Into<String>, day: Option<DayIndex>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: WorkflowId::new(),
            name: name.into(),
            is_template: false,
            day_of_week: day.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an empty template.
    pub fn template(name: impl Into<String>) -> Self {
        Self {
            is_template: true,
            ..Self::new(name, None)
        }
    }

    /// Set the graph contents.
    pub fn with_graph(mut self, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        self.nodes = nodes;
        self.edges = edges;
        self
    }

    /// Merge a partial update and refresh `updated_at`.
    pub fn apply(&mut self, update: WorkflowUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(nodes) = update.nodes {
            self.nodes = nodes;
        }
        if let Some(edges) = update.edges {
            self.edges = edges;
        }
        self.updated_at = update.updated_at.unwrap_or_else(chrono::Utc::now);
    }
}

/// Partial update merged by a store's `put_workflow`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowUpdate {
    /// New name
    pub name: Option<String>,

    /// Replacement node list
    pub nodes: Option<Vec<Node>>,

    /// Replacement edge list
    pub edges: Option<Vec<Edge>>,

    /// Explicit timestamp; defaults to now
    pub updated_at: Option<Time>,
}

impl WorkflowUpdate {
    /// Replace both nodes and edges.
    pub fn graph(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            nodes: Some(nodes),
            edges: Some(edges),
            ..Default::default()
        }
    }

    /// Replace only the nodes.
    pub fn nodes(nodes: Vec<Node>) -> Self {
        Self {
            nodes: Some(nodes),
            ..Default::default()
        }
    }
}

/// Filter for listing workflows.
#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    /// Only templates (`true`) or only day workflows (`false`)
    pub is_template: Option<bool>,

    /// Only workflows bound to this weekday
    pub day_of_week: Option<DayIndex>,
}

impl WorkflowFilter {
    /// Match only templates.
    pub fn templates() -> Self {
        Self {
            is_template: Some(true),
            ..Default::default()
        }
    }

    /// Match only day workflows.
    pub fn day_workflows() -> Self {
        Self {
            is_template: Some(false),
            ..Default::default()
        }
    }

    /// Match the day workflow for `day`.
    pub fn for_day(day: DayIndex) -> Self {
        Self {
            is_template: Some(false),
            day_of_week: Some(day),
        }
    }

    /// Whether `workflow` passes the filter.
    pub fn matches(&self, workflow: &Workflow) -> bool {
        if let Some(is_template) = self.is_template {
            if workflow.is_template != is_template {
                return false;
            }
        }
        if let Some(day) = self.day_of_week {
            if workflow.day_of_week.get() != Some(day) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{LockType, NodeCard};

    #[test]
    fn workflow_uses_camel_case_fields() {
        let wf = Workflow::new("Monday Workflow", Some(0));
        let value = serde_json::to_value(&wf).unwrap();
        assert_eq!(value["isTemplate"], false);
        assert_eq!(value["dayOfWeek"], 0);
        assert!(value.get("createdAt").is_some());
        assert!(value.get("updatedAt").is_some());
    }

    #[test]
    fn templates_omit_day() {
        let value = serde_json::to_value(Workflow::template("Weekday")).unwrap();
        assert_eq!(value["isTemplate"], true);
        assert!(value.get("dayOfWeek").is_none());
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let gate = Node::control(NodeCard::new("Apps", ""), LockType::Apps);
        let mut wf = Workflow::new("Tuesday", Some(1)).with_graph(vec![gate], vec![]);
        let before = wf.updated_at;

        wf.apply(WorkflowUpdate {
            edges: Some(vec![]),
            updated_at: Some(before + chrono::Duration::seconds(5)),
            ..Default::default()
        });

        assert_eq!(wf.nodes.len(), 1);
        assert_eq!(wf.name, "Tuesday");
        assert_eq!(wf.updated_at, before + chrono::Duration::seconds(5));
    }

    #[test]
    fn filter_matches_day_workflows() {
        let monday = Workflow::new("Mon", Some(0));
        let template = Workflow::template("T");

        assert!(WorkflowFilter::for_day(0).matches(&monday));
        assert!(!WorkflowFilter::for_day(1).matches(&monday));
        assert!(!WorkflowFilter::day_workflows().matches(&template));
        assert!(WorkflowFilter::templates().matches(&template));
        assert!(WorkflowFilter::default().matches(&template));
    }

    #[test]
    fn null_day_survives_a_save() {
        let mut value = serde_json::to_value(Workflow::template("Weekday")).unwrap();
        value["dayOfWeek"] = serde_json::Value::Null;

        let wf: Workflow = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(wf.day_of_week, Nullable::Null);
        assert_eq!(serde_json::to_value(&wf).unwrap(), value);
    }

    #[test]
    fn workflow_round_trips_through_json() {
        let task = Node::task(NodeCard::new("Stretch", ""), None);
        let gate = Node::control(NodeCard::new("Wifi", ""), LockType::Wifi);
        let edge = Edge::new(task.id.clone(), gate.id.clone());
        let wf = Workflow::new("Wed", Some(2)).with_graph(vec![task, gate], vec![edge]);

        let json = serde_json::to_string(&wf).unwrap();
        let back: Workflow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wf);
    }
}
