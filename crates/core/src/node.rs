//! Node model - the vertices of a routine workflow.

use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::nullable::Nullable;
use crate::schedule::Schedule;

/// Editor layout coordinates. Opaque to the lock engine.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal offset
    pub x: f64,

    /// Vertical offset
    pub y: f64,
}

impl Position {
    /// Create a position.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Presentation fields every node carries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeCard {
    /// Short title
    pub title: String,

    /// Longer description
    #[serde(default)]
    pub description: String,

    /// Icon name
    #[serde(default)]
    pub icon: String,
}

impl NodeCard {
    /// Create a card with a title and description.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            icon: String::new(),
        }
    }

    /// Set the icon.
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }
}

/// Payload of the node that starts a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartData {
    /// Presentation fields
    #[serde(flatten)]
    pub card: NodeCard,

    /// Informational trigger time; not read by the lock engine.
    #[serde(default, skip_serializing_if = "Nullable::is_absent")]
    pub trigger_time: Nullable<String>,
}

/// Payload of a task whose completion is proven with an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskData {
    /// Presentation fields
    #[serde(flatten)]
    pub card: NodeCard,

    /// Set once proof has been accepted; stays set until explicitly reset.
    #[serde(default)]
    pub validated: bool,

    /// Opaque reference to the accepted proof.
    #[serde(default, skip_serializing_if = "Nullable::is_absent")]
    pub image_proof: Nullable<String>,

    /// Window during which the task gates its controls.
    #[serde(default, skip_serializing_if = "Nullable::is_absent")]
    pub schedule: Nullable<Schedule>,
}

/// Capability a system control gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockType {
    /// Network access
    Wifi,
    /// Application launching
    Apps,
    /// Entertainment content
    Entertainment,
}

impl LockType {
    /// All lock types.
    pub const ALL: [LockType; 3] = [LockType::Wifi, LockType::Apps, LockType::Entertainment];

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockType::Wifi => "wifi",
            LockType::Apps => "apps",
            LockType::Entertainment => "entertainment",
        }
    }
}

impl std::fmt::Display for LockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wifi" => Ok(LockType::Wifi),
            "apps" => Ok(LockType::Apps),
            "entertainment" => Ok(LockType::Entertainment),
            other => Err(format!("unknown lock type: {other}")),
        }
    }
}

/// Payload of a gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlData {
    /// Presentation fields
    #[serde(flatten)]
    pub card: NodeCard,

    /// Capability this gate controls.
    pub lock_type: LockType,

    /// Cached projection of the lock engine's output. Only the engine
    /// writes it.
    #[serde(default)]
    pub is_locked: bool,
}

/// Variant-specific part of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum NodeKind {
    /// Entry point of the routine
    WorkflowStart(StartData),
    /// Task proven complete with an image
    VerifiableTask(TaskData),
    /// Lockable capability
    SystemControl(ControlData),
}

/// A vertex of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique, stable identifier
    pub id: NodeId,

    /// Layout position
    #[serde(default)]
    pub position: Position,

    /// Variant payload
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    /// Create a workflow start node.
    pub fn start(card: NodeCard) -> Self {
        Self::with_kind(NodeKind::WorkflowStart(StartData {
            card,
            trigger_time: Nullable::Absent,
        }))
    }

    /// Create an unvalidated task node.
    pub fn task(card: NodeCard, schedule: Option<Schedule>) -> Self {
        Self::with_kind(NodeKind::VerifiableTask(TaskData {
            card,
            validated: false,
            image_proof: Nullable::Absent,
            schedule: schedule.into(),
        }))
    }

    /// Create an unlocked gate node.
    pub fn control(card: NodeCard, lock_type: LockType) -> Self {
        Self::with_kind(NodeKind::SystemControl(ControlData {
            card,
            lock_type,
            is_locked: false,
        }))
    }

    fn with_kind(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            position: Position::default(),
            kind,
        }
    }

    /// Replace the generated id.
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the layout position.
    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Presentation fields.
    pub fn card(&self) -> &NodeCard {
        match &self.kind {
            NodeKind::WorkflowStart(data) => &data.card,
            NodeKind::VerifiableTask(data) => &data.card,
            NodeKind::SystemControl(data) => &data.card,
        }
    }

    /// Node title.
    pub fn title(&self) -> &str {
        &self.card().title
    }

    /// Task payload, if this is a verifiable task.
    pub fn as_task(&self) -> Option<&TaskData> {
        match &self.kind {
            NodeKind::VerifiableTask(data) => Some(data),
            _ => None,
        }
    }

    /// Mutable task payload, if this is a verifiable task.
    pub fn as_task_mut(&mut self) -> Option<&mut TaskData> {
        match &mut self.kind {
            NodeKind::VerifiableTask(data) => Some(data),
            _ => None,
        }
    }

    /// Gate payload, if this is a system control.
    pub fn as_control(&self) -> Option<&ControlData> {
        match &self.kind {
            NodeKind::SystemControl(data) => Some(data),
            _ => None,
        }
    }

    /// Mutable gate payload, if this is a system control.
    pub fn as_control_mut(&mut self) -> Option<&mut ControlData> {
        match &mut self.kind {
            NodeKind::SystemControl(data) => Some(data),
            _ => None,
        }
    }

    /// Short label for the node's variant.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            NodeKind::WorkflowStart(_) => "start",
            NodeKind::VerifiableTask(_) => "task",
            NodeKind::SystemControl(_) => "control",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ClockTime;
    use serde_json::json;

    #[test]
    fn task_node_wire_shape() {
        let node = Node::task(
            NodeCard::new("Wash Face", "Start fresh").with_icon("face"),
            Some(Schedule::new(
                ClockTime::parse("07:00").unwrap(),
                ClockTime::parse("07:30").unwrap(),
                [0, 1],
            )),
        )
        .with_id("1");

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["id"], "1");
        assert_eq!(value["type"], "verifiableTask");
        assert_eq!(value["position"], json!({"x": 0.0, "y": 0.0}));
        assert_eq!(value["data"]["title"], "Wash Face");
        assert_eq!(value["data"]["icon"], "face");
        assert_eq!(value["data"]["validated"], false);
        assert_eq!(value["data"]["schedule"]["startTime"], "07:00");
        assert!(value["data"].get("imageProof").is_none());
    }

    #[test]
    fn control_node_reads_editor_json() {
        let raw = json!({
            "id": "gate",
            "type": "systemControl",
            "position": {"x": 10.0, "y": 20.0},
            "data": {
                "title": "Apps",
                "description": "",
                "icon": "lock",
                "lockType": "apps",
                "isLocked": true
            }
        });

        let node: Node = serde_json::from_value(raw.clone()).unwrap();
        let control = node.as_control().unwrap();
        assert_eq!(control.lock_type, LockType::Apps);
        assert!(control.is_locked);
        assert_eq!(node.position, Position::new(10.0, 20.0));
        assert_eq!(serde_json::to_value(&node).unwrap(), raw);
    }

    #[test]
    fn null_optionals_round_trip_as_null() {
        let raw = json!({
            "id": "t",
            "type": "verifiableTask",
            "position": {"x": 0.0, "y": 0.0},
            "data": {
                "title": "Read",
                "description": "",
                "icon": "",
                "validated": true,
                "imageProof": null,
                "schedule": null
            }
        });

        let node: Node = serde_json::from_value(raw.clone()).unwrap();
        let task = node.as_task().unwrap();
        assert!(task.validated);
        assert!(task.image_proof.is_none());
        assert!(task.schedule.is_none());
        assert_eq!(serde_json::to_value(&node).unwrap(), raw);
    }

    #[test]
    fn omitted_optionals_stay_omitted() {
        let raw = json!({
            "id": "s",
            "type": "workflowStart",
            "position": {"x": 0.0, "y": 0.0},
            "data": {"title": "Morning", "description": "", "icon": ""}
        });

        let node: Node = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&node).unwrap(), raw);

        let with_null = json!({
            "id": "s",
            "type": "workflowStart",
            "position": {"x": 0.0, "y": 0.0},
            "data": {"title": "Morning", "description": "", "icon": "", "triggerTime": null}
        });
        let node: Node = serde_json::from_value(with_null.clone()).unwrap();
        assert_eq!(serde_json::to_value(&node).unwrap(), with_null);
    }

    #[test]
    fn start_node_keeps_trigger_time() {
        let mut node = Node::start(NodeCard::new("Morning", ""));
        if let NodeKind::WorkflowStart(data) = &mut node.kind {
            data.trigger_time = Nullable::Value("06:30".to_string());
        }
        let back: Node = serde_json::from_str(&serde_json::to_string(&node).unwrap()).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn lock_type_parses_case_insensitively() {
        assert_eq!("WiFi".parse::<LockType>().unwrap(), LockType::Wifi);
        assert!("network".parse::<LockType>().is_err());
    }
}
