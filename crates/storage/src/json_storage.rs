//! JSON file storage implementation.
//!
//! Stores each workflow as `workflows/<id>.json` under a root directory.
//! Writes go to a sibling temp file that is renamed over the target, so a
//! reader never observes a half-written node list.

use std::path::{Path, PathBuf};

use daylock_core::{Workflow, WorkflowFilter, WorkflowId, WorkflowUpdate};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::trait_::sort_workflows;
use super::{Result, StorageError, WorkflowStore};

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStorage {
    /// Create storage rooted at `root`, creating the directory layout.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("workflows")).await?;

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn workflow_path(&self, id: &WorkflowId) -> Result<PathBuf> {
        let raw = id.as_str();
        if raw.is_empty() || raw.contains(&['/', '\\'][..]) || raw.starts_with('.') {
            return Err(StorageError::Other(format!("invalid workflow id: {raw:?}")));
        }
        Ok(self.root.join("workflows").join(format!("{raw}.json")))
    }

    async fn write_atomic(&self, path: &Path, workflow: &Workflow) -> Result<()> {
        let json = serde_json::to_string_pretty(workflow)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WorkflowStore for JsonStorage {
    async fn create_workflow(&self, workflow: &Workflow) -> Result<()> {
        let path = self.workflow_path(&workflow.id)?;
        let _guard = self.write_lock.lock().await;

        if fs::try_exists(&path).await? {
            return Err(StorageError::AlreadyExists(workflow.id.to_string()));
        }
        self.write_atomic(&path, workflow).await?;
        debug!(workflow_id = %workflow.id, "created workflow file");
        Ok(())
    }

    async fn get_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        read_json(&self.workflow_path(id)?).await
    }

    async fn put_workflow(&self, id: &WorkflowId, update: WorkflowUpdate) -> Result<Workflow> {
        let path = self.workflow_path(id)?;
        let _guard = self.write_lock.lock().await;

        let Some(mut workflow) = read_json::<Workflow>(&path).await? else {
            return Err(StorageError::NotFound(id.to_string()));
        };
        workflow.apply(update);
        self.write_atomic(&path, &workflow).await?;
        Ok(workflow)
    }

    async fn list_workflows(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>> {
        let all: Vec<Workflow> = list_dir(&self.root.join("workflows")).await?;
        let mut matching: Vec<_> = all.into_iter().filter(|w| filter.matches(w)).collect();
        sort_workflows(&mut matching);
        Ok(matching)
    }

    async fn delete_workflow(&self, id: &WorkflowId) -> Result<()> {
        let path = self.workflow_path(id)?;
        let _guard = self.write_lock.lock().await;

        fs::remove_file(path).await.or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) }
        })?;
        Ok(())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&path).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => warn!("skipping unreadable workflow file {}: {}", path.display(), e),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use daylock_core::{Edge, LockType, Node, NodeCard};

    fn sample() -> Workflow {
        let task = Node::task(NodeCard::new("Stretch", ""), None);
        let gate = Node::control(NodeCard::new("Wifi", ""), LockType::Wifi);
        let edge = Edge::new(task.id.clone(), gate.id.clone());
        Workflow::new("Monday Workflow", Some(0)).with_graph(vec![task, gate], vec![edge])
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let wf = sample();

        storage.create_workflow(&wf).await.unwrap();
        let loaded = storage.get_workflow(&wf.id).await.unwrap().unwrap();
        assert_eq!(loaded, wf);
    }

    #[tokio::test]
    async fn create_refuses_existing_id() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let wf = sample();

        storage.create_workflow(&wf).await.unwrap();
        let err = storage.create_workflow(&wf).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn put_merges_and_bumps_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let wf = sample();
        storage.create_workflow(&wf).await.unwrap();

        let stored = storage
            .put_workflow(&wf.id, WorkflowUpdate::nodes(vec![]))
            .await
            .unwrap();

        assert!(stored.nodes.is_empty());
        assert_eq!(stored.edges.len(), 1);
        assert!(stored.updated_at >= wf.updated_at);
        assert_eq!(storage.get_workflow(&wf.id).await.unwrap().unwrap(), stored);
    }

    #[tokio::test]
    async fn put_on_missing_workflow_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();

        let err = storage
            .put_workflow(&WorkflowId::from("nope"), WorkflowUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_templates() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        storage.create_workflow(&sample()).await.unwrap();
        storage.create_workflow(&Workflow::template("Weekday")).await.unwrap();

        let templates = storage.list_workflows(&WorkflowFilter::templates()).await.unwrap();
        let days = storage.list_workflows(&WorkflowFilter::day_workflows()).await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "Weekday");
        assert_eq!(days.len(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let wf = sample();
        storage.create_workflow(&wf).await.unwrap();

        storage.delete_workflow(&wf.id).await.unwrap();
        storage.delete_workflow(&wf.id).await.unwrap();
        assert!(storage.get_workflow(&wf.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn path_like_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();

        let err = storage
            .get_workflow(&WorkflowId::from("../escape"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Other(_)));
    }
}
