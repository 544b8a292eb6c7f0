//! Typed store for durable task rows.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use hlspack_models::{Task, TaskKey, TaskKind};

use crate::datastore::{Datastore, Precondition, WriteOp};
use crate::error::StoreResult;

/// Collection name for a task kind.
pub fn task_collection(kind: TaskKind) -> String {
    format!("{}_tasks", kind.as_str())
}

/// Store for pending task rows, one collection per kind.
///
/// Row existence is load-bearing: a row exists iff its unit of work is still
/// pending. Mutations that must be atomic with container state are composed
/// via the `*_write` builders into a single conditional batch.
#[derive(Clone)]
pub struct TaskStore {
    db: Arc<dyn Datastore>,
}

impl TaskStore {
    pub fn new(db: Arc<dyn Datastore>) -> Self {
        Self { db }
    }

    /// Get a task row and its version token.
    pub async fn get(&self, kind: TaskKind, key: &TaskKey) -> StoreResult<Option<(Task, String)>> {
        match self.db.get(&task_collection(kind), &key.doc_id()).await? {
            Some(doc) => {
                let task: Task = serde_json::from_value(doc.data)?;
                Ok(Some((task, doc.version)))
            }
            None => Ok(None),
        }
    }

    /// List all task rows of a kind.
    pub async fn list(&self, kind: TaskKind) -> StoreResult<Vec<Task>> {
        let docs = self.db.list(&task_collection(kind)).await?;
        let mut tasks = Vec::with_capacity(docs.len());
        for doc in docs {
            tasks.push(serde_json::from_value(doc.data)?);
        }
        Ok(tasks)
    }

    /// List task rows of a kind that are eligible for claim at `now`.
    pub async fn list_due(&self, kind: TaskKind, now: DateTime<Utc>) -> StoreResult<Vec<Task>> {
        Ok(self
            .list(kind)
            .await?
            .into_iter()
            .filter(|t| t.is_due(now))
            .collect())
    }

    /// Insert (upsert) a task row outside a larger batch.
    pub async fn insert(&self, task: &Task) -> StoreResult<()> {
        self.db.batch_write(vec![Self::insert_write(task)?]).await
    }

    /// Delete a task row outside a larger batch.
    pub async fn delete(&self, kind: TaskKind, key: &TaskKey) -> StoreResult<()> {
        self.db
            .batch_write(vec![Self::delete_write(kind, key)])
            .await
    }

    /// Upsert write for a task row. Unconditional: re-inserting the same
    /// pending work is idempotent.
    pub fn insert_write(task: &Task) -> StoreResult<WriteOp> {
        Ok(WriteOp::put(
            task_collection(task.kind),
            task.key.doc_id(),
            serde_json::to_value(task)?,
            Precondition::None,
        ))
    }

    /// Conditional update write for a claimed/extended task row.
    pub fn update_write(task: &Task, version: &str) -> StoreResult<WriteOp> {
        Ok(WriteOp::put(
            task_collection(task.kind),
            task.key.doc_id(),
            serde_json::to_value(task)?,
            Precondition::Version(version.to_string()),
        ))
    }

    /// Unconditional delete write for a completed task row.
    pub fn delete_write(kind: TaskKind, key: &TaskKey) -> WriteOp {
        WriteOp::delete(task_collection(kind), key.doc_id(), Precondition::None)
    }

    pub fn datastore(&self) -> &Arc<dyn Datastore> {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatastore;
    use hlspack_models::ContainerId;

    fn store() -> TaskStore {
        TaskStore::new(Arc::new(MemoryDatastore::new()))
    }

    #[tokio::test]
    async fn insert_list_delete_cycle() {
        let store = store();
        let key = TaskKey::container_file(ContainerId::from_string("c1"), "v.mp4");
        let task = Task::immediate(TaskKind::MediaFormatting, key.clone());

        store.insert(&task).await.unwrap();
        assert_eq!(store.list(TaskKind::MediaFormatting).await.unwrap().len(), 1);
        assert!(store
            .get(TaskKind::MediaFormatting, &key)
            .await
            .unwrap()
            .is_some());

        store.delete(TaskKind::MediaFormatting, &key).await.unwrap();
        assert!(store
            .get(TaskKind::MediaFormatting, &key)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn list_due_filters_future_tasks() {
        let store = store();
        let now = Utc::now();

        let due = Task::new(
            TaskKind::R2KeyDeleting,
            TaskKey::storage_key("root/a"),
            now - chrono::Duration::minutes(1),
        );
        let future = Task::new(
            TaskKind::R2KeyDeleting,
            TaskKey::storage_key("root/b"),
            now + chrono::Duration::days(365),
        );
        store.insert(&due).await.unwrap();
        store.insert(&future).await.unwrap();

        let due_tasks = store.list_due(TaskKind::R2KeyDeleting, now).await.unwrap();
        assert_eq!(due_tasks.len(), 1);
        assert_eq!(due_tasks[0].key, due.key);
    }

    #[tokio::test]
    async fn kinds_use_separate_collections() {
        let store = store();
        let key = TaskKey::container_version(ContainerId::from_string("c1"), 1);
        store
            .insert(&Task::immediate(TaskKind::Syncing, key.clone()))
            .await
            .unwrap();
        assert!(store
            .get(TaskKind::WritingToFile, &key)
            .await
            .unwrap()
            .is_none());
    }
}
