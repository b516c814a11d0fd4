//! Day workflows and templates.
//!
//! Each weekday has at most one non-template workflow. Templates have no
//! day binding and are copied into a day on request.

use chrono::NaiveDateTime;
use daylock_core::{
    day_name, starter_graph, weekday_index, DayIndex, Edge, Node, NodeKind, Workflow,
    WorkflowFilter, WorkflowId, WorkflowUpdate,
};
use daylock_storage::{Result, StorageError, WorkflowStore};
use tracing::info;

/// Manages the template and per-day workflow lifecycle over a store.
pub struct WorkflowLibrary<S: WorkflowStore> {
    store: S,
}

impl<S: WorkflowStore> WorkflowLibrary<S> {
    /// Create a library over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Get a reference to the storage.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create an empty workflow, bound to `day` when given.
    pub async fn create(&self, name: &str, day: Option<DayIndex>) -> Result<Workflow> {
        if let Some(day) = day {
            let day_label = checked_day(day)?;
            if self.workflow_for_day(day).await?.is_some() {
                return Err(StorageError::AlreadyExists(format!("{day_label} workflow")));
            }
        }
        let workflow = Workflow::new(name, day);
        self.store.create_workflow(&workflow).await?;
        info!(workflow_id = %workflow.id, name, "workflow created");
        Ok(workflow)
    }

    /// The workflow bound to `day`, if any.
    pub async fn workflow_for_day(&self, day: DayIndex) -> Result<Option<Workflow>> {
        let found = self.store.list_workflows(&WorkflowFilter::for_day(day)).await?;
        // oldest wins if an external writer broke the one-per-day rule
        Ok(found.into_iter().next())
    }

    /// The workflow for the weekday of `now`.
    pub async fn today(&self, now: NaiveDateTime) -> Result<Option<Workflow>> {
        self.workflow_for_day(weekday_index(now)).await
    }

    /// Store a graph as `day`'s workflow, replacing the existing one's
    /// contents or creating it.
    pub async fn save_for_day(
        &self,
        name: &str,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        day: DayIndex,
    ) -> Result<Workflow> {
        checked_day(day)?;
        match self.workflow_for_day(day).await? {
            Some(existing) => {
                let update = WorkflowUpdate {
                    name: Some(name.to_string()),
                    ..WorkflowUpdate::graph(nodes, edges)
                };
                self.store.put_workflow(&existing.id, update).await
            }
            None => {
                let workflow = Workflow::new(name, Some(day)).with_graph(nodes, edges);
                self.store.create_workflow(&workflow).await?;
                Ok(workflow)
            }
        }
    }

    /// Store a graph as a new template.
    pub async fn save_template(&self, name: &str, nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Workflow> {
        let template = Workflow::template(name).with_graph(nodes, edges);
        self.store.create_workflow(&template).await?;
        info!(workflow_id = %template.id, name, "template saved");
        Ok(template)
    }

    /// All templates, oldest first.
    pub async fn list_templates(&self) -> Result<Vec<Workflow>> {
        self.store.list_workflows(&WorkflowFilter::templates()).await
    }

    /// All day workflows, oldest first.
    pub async fn list_days(&self) -> Result<Vec<Workflow>> {
        self.store.list_workflows(&WorkflowFilter::day_workflows()).await
    }

    /// Copy a template's graph into `day`'s workflow.
    ///
    /// Tasks start unvalidated and gates unlocked; the reconciler derives
    /// real lock state once the workflow is loaded.
    pub async fn apply_template(&self, template_id: &WorkflowId, day: DayIndex) -> Result<Workflow> {
        let day_label = checked_day(day)?;
        let template = self
            .store
            .get_workflow(template_id)
            .await?
            .filter(|w| w.is_template)
            .ok_or_else(|| StorageError::NotFound(format!("template {template_id}")))?;

        let nodes: Vec<Node> = template.nodes.into_iter().map(fresh).collect();
        let edges = template.edges;

        let workflow = match self.workflow_for_day(day).await? {
            Some(existing) => {
                self.store
                    .put_workflow(&existing.id, WorkflowUpdate::graph(nodes, edges))
                    .await?
            }
            None => {
                let workflow = Workflow::new(format!("{} ({day_label})", template.name), Some(day))
                    .with_graph(nodes, edges);
                self.store.create_workflow(&workflow).await?;
                workflow
            }
        };
        info!(template = %template_id, workflow_id = %workflow.id, day = day_label, "template applied");
        Ok(workflow)
    }

    /// Create `day`'s workflow from the starter graph, unless one exists.
    pub async fn seed_defaults(&self, day: DayIndex) -> Result<Workflow> {
        let day_label = checked_day(day)?;
        if let Some(existing) = self.workflow_for_day(day).await? {
            return Ok(existing);
        }
        let (nodes, edges) = starter_graph();
        let workflow = Workflow::new(format!("{day_label} Workflow"), Some(day)).with_graph(nodes, edges);
        self.store.create_workflow(&workflow).await?;
        info!(workflow_id = %workflow.id, day = day_label, "seeded starter workflow");
        Ok(workflow)
    }
}

fn checked_day(day: DayIndex) -> Result<&'static str> {
    day_name(day).ok_or_else(|| StorageError::Other(format!("day of week out of range: {day}")))
}

/// Clear per-day progress carried in a node.
fn fresh(mut node: Node) -> Node {
    match &mut node.kind {
        NodeKind::VerifiableTask(task) => {
            task.validated = false;
            task.image_proof.set(None);
        }
        NodeKind::SystemControl(control) => control.is_locked = false,
        NodeKind::WorkflowStart(_) => {}
    }
    node
}
