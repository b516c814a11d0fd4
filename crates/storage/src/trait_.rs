//! Storage trait abstraction.

use async_trait::async_trait;
use daylock_core::{Workflow, WorkflowFilter, WorkflowId, WorkflowUpdate};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Item already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Durable read/modify/write of workflow records.
///
/// A workflow is the only unit of persistence; its nodes and edges are
/// embedded. `put_workflow` must be atomic per call: concurrent readers see
/// either the old or the new node list, never a mix.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert a new workflow.
    async fn create_workflow(&self, workflow: &Workflow) -> Result<()>;

    /// Load a workflow by ID.
    async fn get_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>>;

    /// Merge a partial update into an existing workflow and return the
    /// stored result.
    async fn put_workflow(&self, id: &WorkflowId, update: WorkflowUpdate) -> Result<Workflow>;

    /// List workflows matching the filter, oldest first.
    async fn list_workflows(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>>;

    /// Delete a workflow. Deleting a missing workflow is not an error.
    async fn delete_workflow(&self, id: &WorkflowId) -> Result<()>;
}

#[async_trait]
impl<T: WorkflowStore + ?Sized> WorkflowStore for std::sync::Arc<T> {
    async fn create_workflow(&self, workflow: &Workflow) -> Result<()> {
        (**self).create_workflow(workflow).await
    }

    async fn get_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        (**self).get_workflow(id).await
    }

    async fn put_workflow(&self, id: &WorkflowId, update: WorkflowUpdate) -> Result<Workflow> {
        (**self).put_workflow(id, update).await
    }

    async fn list_workflows(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>> {
        (**self).list_workflows(filter).await
    }

    async fn delete_workflow(&self, id: &WorkflowId) -> Result<()> {
        (**self).delete_workflow(id).await
    }
}

/// Sort order shared by the backends.
pub(crate) fn sort_workflows(workflows: &mut [Workflow]) {
    workflows.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
