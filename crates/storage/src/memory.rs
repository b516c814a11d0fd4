//! In-process storage backend.

use std::collections::HashMap;

use daylock_core::{Workflow, WorkflowFilter, WorkflowId, WorkflowUpdate};
use tokio::sync::RwLock;

use super::trait_::sort_workflows;
use super::{Result, StorageError, WorkflowStore};

/// Workflow store held entirely in memory.
#[derive(Default)]
pub struct MemoryStorage {
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored workflows.
    pub async fn len(&self) -> usize {
        self.workflows.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.workflows.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl WorkflowStore for MemoryStorage {
    async fn create_workflow(&self, workflow: &Workflow) -> Result<()> {
        let mut workflows = self.workflows.write().await;
        if workflows.contains_key(&workflow.id) {
            return Err(StorageError::AlreadyExists(workflow.id.to_string()));
        }
        workflows.insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        Ok(self.workflows.read().await.get(id).cloned())
    }

    async fn put_workflow(&self, id: &WorkflowId, update: WorkflowUpdate) -> Result<Workflow> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        workflow.apply(update);
        Ok(workflow.clone())
    }

    async fn list_workflows(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>> {
        let mut matching: Vec<_> = self
            .workflows
            .read()
            .await
            .values()
            .filter(|w| filter.matches(w))
            .cloned()
            .collect();
        sort_workflows(&mut matching);
        Ok(matching)
    }

    async fn delete_workflow(&self, id: &WorkflowId) -> Result<()> {
        self.workflows.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_visible_to_readers() {
        let storage = MemoryStorage::new();
        let wf = Workflow::new("Thursday", Some(3));
        storage.create_workflow(&wf).await.unwrap();

        storage
            .put_workflow(
                &wf.id,
                WorkflowUpdate {
                    name: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let loaded = storage.get_workflow(&wf.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Renamed");
    }

    #[tokio::test]
    async fn list_is_ordered_by_creation() {
        let storage = MemoryStorage::new();
        let first = Workflow::new("first", Some(0));
        let mut second = Workflow::new("second", Some(1));
        second.created_at = first.created_at + chrono::Duration::seconds(1);

        storage.create_workflow(&second).await.unwrap();
        storage.create_workflow(&first).await.unwrap();

        let names: Vec<_> = storage
            .list_workflows(&WorkflowFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.name)
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn delete_removes_embedded_graph() {
        let storage = MemoryStorage::new();
        let wf = Workflow::new("Friday", Some(4));
        storage.create_workflow(&wf).await.unwrap();

        storage.delete_workflow(&wf.id).await.unwrap();
        assert!(storage.is_empty().await);
    }
}
