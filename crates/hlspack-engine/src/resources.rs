//! Resource lifecycle guard: reserve-before-write, confirm-or-rollback.
//!
//! Every stage that writes new storage objects reserves their keys first, so
//! a crash at any later point leaves keys that the safety-net deletion task
//! will eventually sweep. Success pins the keys far out; failure or
//! supersession pulls their deletion near.

use chrono::Utc;
use tracing::info;

use hlspack_datastore::{ResourceRegistry, StoreResult, WriteOp};

use crate::backoff::{gc_soon_window, retain_window};
use crate::error::EngineResult;

/// Lifecycle operations over the resource registry.
#[derive(Clone)]
pub struct ResourceLifecycle {
    registry: ResourceRegistry,
}

impl ResourceLifecycle {
    pub fn new(registry: ResourceRegistry) -> Self {
        Self { registry }
    }

    /// Reserve fresh keys before writing any bytes under them. Commits a
    /// registry row plus a far-future deletion task per key.
    pub async fn reserve(&self, keys: &[String]) -> EngineResult<()> {
        self.registry
            .reserve(keys, Utc::now() + retain_window())
            .await?;
        info!(count = keys.len(), "Reserved storage keys");
        Ok(())
    }

    /// Writes pinning successfully committed keys to the far-future window,
    /// for inclusion in the finalize batch.
    pub async fn confirm_writes(&self, keys: &[String]) -> StoreResult<Vec<WriteOp>> {
        let retained_until = Utc::now() + retain_window();
        let mut writes = Vec::with_capacity(keys.len());
        for key in keys {
            writes.push(
                self.registry
                    .reschedule_deletion_write(key, retained_until)
                    .await?,
            );
        }
        Ok(writes)
    }

    /// Writes scheduling superseded keys for near-term deletion, for
    /// inclusion in the finalize batch that activates their replacements.
    pub async fn supersede_writes(&self, keys: &[String]) -> StoreResult<Vec<WriteOp>> {
        let delete_at = Utc::now() + gc_soon_window();
        let mut writes = Vec::with_capacity(keys.len() * 2);
        for key in keys {
            match self.registry.get(key).await? {
                Some(_) => {
                    writes.push(self.registry.reschedule_deletion_write(key, delete_at).await?);
                }
                // The pairing invariant must hold even for keys written
                // before the registry knew about them.
                None => writes.extend(ResourceRegistry::reserve_writes(key, delete_at)?),
            }
        }
        Ok(writes)
    }

    /// Pull reserved keys' deletion tasks to the near-term window after a
    /// failed or superseded attempt. Partial writes are swept with them.
    pub async fn rollback(&self, keys: &[String]) -> EngineResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.registry
            .schedule_deletion(keys, Utc::now() + gc_soon_window())
            .await?;
        info!(count = keys.len(), "Rolled back storage keys to near-term GC");
        Ok(())
    }

    /// Writes removing a key's registry row and deletion task together, once
    /// GC has physically deleted the objects.
    pub fn release_writes(key: &str) -> Vec<WriteOp> {
        ResourceRegistry::release_writes(key)
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use hlspack_datastore::{Datastore, MemoryDatastore, TaskStore};
    use hlspack_models::{TaskKey, TaskKind};

    fn setup() -> (Arc<dyn Datastore>, ResourceLifecycle, TaskStore) {
        let db: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let lifecycle = ResourceLifecycle::new(ResourceRegistry::new(Arc::clone(&db)));
        let tasks = TaskStore::new(Arc::clone(&db));
        (db, lifecycle, tasks)
    }

    async fn deletion_time(tasks: &TaskStore, key: &str) -> chrono::DateTime<Utc> {
        tasks
            .get(TaskKind::R2KeyDeleting, &TaskKey::storage_key(key))
            .await
            .unwrap()
            .unwrap()
            .0
            .execution_time
    }

    #[tokio::test]
    async fn reserve_then_rollback_moves_window_near() {
        let (_db, lifecycle, tasks) = setup();
        let keys = vec!["root/trk-1".to_string()];

        lifecycle.reserve(&keys).await.unwrap();
        assert!(deletion_time(&tasks, "root/trk-1").await > Utc::now() + chrono::Duration::days(300));

        lifecycle.rollback(&keys).await.unwrap();
        assert!(deletion_time(&tasks, "root/trk-1").await < Utc::now() + chrono::Duration::hours(1));
    }

    #[tokio::test]
    async fn confirm_keeps_exactly_one_deletion_task() {
        let (db, lifecycle, tasks) = setup();
        let keys = vec!["root/trk-1".to_string()];

        lifecycle.reserve(&keys).await.unwrap();
        db.batch_write(lifecycle.confirm_writes(&keys).await.unwrap())
            .await
            .unwrap();

        let rows = tasks.list(TaskKind::R2KeyDeleting).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].execution_time > Utc::now() + chrono::Duration::days(300));
        assert!(lifecycle.registry().get("root/trk-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn supersede_covers_unregistered_keys() {
        let (db, lifecycle, tasks) = setup();
        let keys = vec!["root/old-master.m3u8".to_string()];

        db.batch_write(lifecycle.supersede_writes(&keys).await.unwrap())
            .await
            .unwrap();

        assert!(lifecycle
            .registry()
            .get("root/old-master.m3u8")
            .await
            .unwrap()
            .is_some());
        assert!(
            deletion_time(&tasks, "root/old-master.m3u8").await
                < Utc::now() + chrono::Duration::hours(1)
        );
    }
}
