//! Resource registry: durable record of storage keys the system has written
//! and is responsible for eventually deleting.
//!
//! Every registry row is paired with one `R2KeyDeleting` task row. The task's
//! execution time encodes intent: far future means "keep unless told
//! otherwise", near term means "delete soon". Both rows are removed together
//! when GC physically deletes the objects.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hlspack_models::{Task, TaskKey, TaskKind};

use crate::datastore::{Datastore, Precondition, WriteOp};
use crate::error::StoreResult;
use crate::tasks::TaskStore;

/// Collection holding registry rows.
pub const R2_KEYS: &str = "r2_keys";

/// One registered storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Storage key or prefix owned by the system
    pub key: String,
    /// When the key was reserved
    pub reserved_time: DateTime<Utc>,
}

/// Store for registry rows and their paired deletion tasks.
#[derive(Clone)]
pub struct ResourceRegistry {
    db: Arc<dyn Datastore>,
}

impl ResourceRegistry {
    pub fn new(db: Arc<dyn Datastore>) -> Self {
        Self { db }
    }

    /// Get a registry entry.
    pub async fn get(&self, key: &str) -> StoreResult<Option<RegistryEntry>> {
        match self.db.get(R2_KEYS, &Self::doc_id(key)).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc.data)?)),
            None => Ok(None),
        }
    }

    /// List all registry entries.
    pub async fn list(&self) -> StoreResult<Vec<RegistryEntry>> {
        let docs = self.db.list(R2_KEYS).await?;
        let mut entries = Vec::with_capacity(docs.len());
        for doc in docs {
            entries.push(serde_json::from_value(doc.data)?);
        }
        Ok(entries)
    }

    /// Writes inserting a registry row plus its paired deletion task,
    /// scheduled at `delete_at`. Must be committed before any bytes are
    /// written under `key`.
    pub fn reserve_writes(key: &str, delete_at: DateTime<Utc>) -> StoreResult<Vec<WriteOp>> {
        let entry = RegistryEntry {
            key: key.to_string(),
            reserved_time: Utc::now(),
        };
        Ok(vec![
            WriteOp::put(
                R2_KEYS,
                Self::doc_id(key),
                serde_json::to_value(&entry)?,
                Precondition::None,
            ),
            TaskStore::insert_write(&Task::new(
                TaskKind::R2KeyDeleting,
                TaskKey::storage_key(key),
                delete_at,
            ))?,
        ])
    }

    /// Write re-scheduling (upserting) the deletion task for `key`,
    /// carrying the existing row's creation time and retry count when one
    /// is present. Only `execution_time` moves.
    pub async fn reschedule_deletion_write(
        &self,
        key: &str,
        delete_at: DateTime<Utc>,
    ) -> StoreResult<WriteOp> {
        let task_key = TaskKey::storage_key(key);
        let tasks = TaskStore::new(Arc::clone(&self.db));
        let mut task = match tasks.get(TaskKind::R2KeyDeleting, &task_key).await? {
            Some((task, _)) => task,
            None => Task::new(TaskKind::R2KeyDeleting, task_key, delete_at),
        };
        task.execution_time = delete_at;
        TaskStore::insert_write(&task)
    }

    /// Writes removing a registry row together with its deletion task, once
    /// the underlying objects are physically gone.
    pub fn release_writes(key: &str) -> Vec<WriteOp> {
        vec![
            WriteOp::delete(R2_KEYS, Self::doc_id(key), Precondition::None),
            TaskStore::delete_write(TaskKind::R2KeyDeleting, &TaskKey::storage_key(key)),
        ]
    }

    /// Reserve several keys atomically.
    pub async fn reserve(&self, keys: &[String], delete_at: DateTime<Utc>) -> StoreResult<()> {
        let mut writes = Vec::with_capacity(keys.len() * 2);
        for key in keys {
            writes.extend(Self::reserve_writes(key, delete_at)?);
        }
        self.db.batch_write(writes).await
    }

    /// Re-schedule the deletion tasks of several keys atomically.
    pub async fn schedule_deletion(
        &self,
        keys: &[String],
        delete_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut writes = Vec::with_capacity(keys.len());
        for key in keys {
            writes.push(self.reschedule_deletion_write(key, delete_at).await?);
        }
        self.db.batch_write(writes).await
    }

    fn doc_id(key: &str) -> String {
        TaskKey::storage_key(key).doc_id()
    }

    pub fn datastore(&self) -> &Arc<dyn Datastore> {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatastore;

    #[tokio::test]
    async fn reserve_pairs_registry_row_with_deletion_task() {
        let db: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let registry = ResourceRegistry::new(Arc::clone(&db));
        let tasks = TaskStore::new(db);

        let delete_at = Utc::now() + chrono::Duration::days(365);
        registry
            .reserve(&["root/trk-1".to_string()], delete_at)
            .await
            .unwrap();

        assert!(registry.get("root/trk-1").await.unwrap().is_some());
        let (task, _) = tasks
            .get(TaskKind::R2KeyDeleting, &TaskKey::storage_key("root/trk-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.execution_time, delete_at);
    }

    #[tokio::test]
    async fn schedule_deletion_moves_the_window() {
        let db: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let registry = ResourceRegistry::new(Arc::clone(&db));
        let tasks = TaskStore::new(db);

        registry
            .reserve(
                &["root/trk-1".to_string()],
                Utc::now() + chrono::Duration::days(365),
            )
            .await
            .unwrap();

        let soon = Utc::now() + chrono::Duration::minutes(5);
        registry
            .schedule_deletion(&["root/trk-1".to_string()], soon)
            .await
            .unwrap();

        let (task, _) = tasks
            .get(TaskKind::R2KeyDeleting, &TaskKey::storage_key("root/trk-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.execution_time, soon);
    }

    #[tokio::test]
    async fn reschedule_preserves_creation_time_and_retry_count() {
        let db: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let registry = ResourceRegistry::new(Arc::clone(&db));
        let tasks = TaskStore::new(Arc::clone(&db));

        registry
            .reserve(
                &["root/trk-1".to_string()],
                Utc::now() + chrono::Duration::days(365),
            )
            .await
            .unwrap();

        // Simulate a claim having touched the task before the reschedule.
        let key = TaskKey::storage_key("root/trk-1");
        let (mut claimed, version) = tasks
            .get(TaskKind::R2KeyDeleting, &key)
            .await
            .unwrap()
            .unwrap();
        claimed.retry_count = 3;
        let write = TaskStore::update_write(&claimed, &version).unwrap();
        db.batch_write(vec![write]).await.unwrap();
        let original_created = claimed.created_time;

        let soon = Utc::now() + chrono::Duration::minutes(5);
        registry
            .schedule_deletion(&["root/trk-1".to_string()], soon)
            .await
            .unwrap();

        let (task, _) = tasks
            .get(TaskKind::R2KeyDeleting, &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.execution_time, soon);
        assert_eq!(task.retry_count, 3);
        assert_eq!(task.created_time, original_created);
    }

    #[tokio::test]
    async fn release_removes_both_rows() {
        let db: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let registry = ResourceRegistry::new(Arc::clone(&db));
        let tasks = TaskStore::new(Arc::clone(&db));

        registry
            .reserve(&["root/trk-1".to_string()], Utc::now())
            .await
            .unwrap();
        db.batch_write(ResourceRegistry::release_writes("root/trk-1"))
            .await
            .unwrap();

        assert!(registry.get("root/trk-1").await.unwrap().is_none());
        assert!(tasks
            .get(TaskKind::R2KeyDeleting, &TaskKey::storage_key("root/trk-1"))
            .await
            .unwrap()
            .is_none());
    }
}
