//! SQLite storage backend.
//!
//! Workflows are stored whole as JSON documents with their filter columns
//! lifted out, so `put_workflow` is a single-row update inside a
//! transaction.

use async_trait::async_trait;
use daylock_core::{Workflow, WorkflowFilter, WorkflowId, WorkflowUpdate};
use sqlx::Row;
use std::path::Path;

use super::trait_::{Result, StorageError, WorkflowStore};

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    /// Database connection pool
    pool: sqlx::SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance.
    pub async fn new(db_url: &str) -> Result<Self> {
        let pool = sqlx::SqlitePool::connect(db_url).await.map_err(backend)?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Open (creating if needed) a database file.
    pub async fn new_from_path(path: &Path) -> Result<Self> {
        Self::new(&format!("sqlite://{}?mode=rwc", path.display())).await
    }

    /// Create an in-memory SQLite storage for testing.
    pub async fn in_memory() -> Result<Self> {
        // a single connection keeps one shared in-memory database
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(backend)?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                is_template INTEGER NOT NULL,
                day_of_week INTEGER,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_workflows_day ON workflows(is_template, day_of_week)")
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(())
    }

    fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<Workflow> {
        let data: String = row.try_get("data").map_err(backend)?;
        Ok(serde_json::from_str(&data)?)
    }
}

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::Other(e.to_string())
}

#[async_trait]
impl WorkflowStore for SqliteStorage {
    async fn create_workflow(&self, workflow: &Workflow) -> Result<()> {
        let data = serde_json::to_string(workflow)?;

        let result = sqlx::query(
            "INSERT INTO workflows (id, is_template, day_of_week, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(workflow.id.as_str())
        .bind(workflow.is_template)
        .bind(workflow.day_of_week.get().map(i64::from))
        .bind(data)
        .bind(workflow.created_at.to_rfc3339())
        .bind(workflow.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::AlreadyExists(workflow.id.to_string()))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn get_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT data FROM workflows WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn put_workflow(&self, id: &WorkflowId, update: WorkflowUpdate) -> Result<Workflow> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row = sqlx::query("SELECT data FROM workflows WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        let mut workflow = Self::decode(&row)?;
        workflow.apply(update);
        let data = serde_json::to_string(&workflow)?;

        sqlx::query("UPDATE workflows SET data = ?, updated_at = ? WHERE id = ?")
            .bind(data)
            .bind(workflow.updated_at.to_rfc3339())
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(workflow)
    }

    async fn list_workflows(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>> {
        let rows = sqlx::query(
            "SELECT data FROM workflows
            WHERE (?1 IS NULL OR is_template = ?1)
              AND (?2 IS NULL OR day_of_week = ?2)
            ORDER BY created_at, id",
        )
        .bind(filter.is_template)
        .bind(filter.day_of_week.map(i64::from))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(Self::decode).collect()
    }

    async fn delete_workflow(&self, id: &WorkflowId) -> Result<()> {
        sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daylock_core::{LockType, Node, NodeCard};

    #[tokio::test]
    async fn test_in_memory_storage() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let gate = Node::control(NodeCard::new("Apps", ""), LockType::Apps);
        let wf = Workflow::new("Saturday", Some(5)).with_graph(vec![gate], vec![]);

        storage.create_workflow(&wf).await.unwrap();
        let loaded = storage.get_workflow(&wf.id).await.unwrap().unwrap();
        assert_eq!(loaded, wf);

        let updated = storage
            .put_workflow(&wf.id, WorkflowUpdate::nodes(vec![]))
            .await
            .unwrap();
        assert!(updated.nodes.is_empty());
    }

    #[tokio::test]
    async fn test_list_by_day() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage.create_workflow(&Workflow::new("Sun", Some(6))).await.unwrap();
        storage.create_workflow(&Workflow::new("Mon", Some(0))).await.unwrap();
        storage.create_workflow(&Workflow::template("Tpl")).await.unwrap();

        let sunday = storage.list_workflows(&WorkflowFilter::for_day(6)).await.unwrap();
        assert_eq!(sunday.len(), 1);
        assert_eq!(sunday[0].name, "Sun");

        let all = storage.list_workflows(&WorkflowFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_create() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let wf = Workflow::new("Mon", Some(0));
        storage.create_workflow(&wf).await.unwrap();
        assert!(matches!(
            storage.create_workflow(&wf).await,
            Err(StorageError::AlreadyExists(_))
        ));
    }
}
