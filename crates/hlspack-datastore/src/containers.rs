//! Typed store for container documents.

use std::sync::Arc;

use tracing::info;

use hlspack_models::{ContainerId, VideoContainer};

use crate::datastore::{Datastore, Precondition, WriteOp};
use crate::error::{StoreError, StoreResult};

/// Collection holding container aggregates.
pub const CONTAINERS: &str = "containers";

/// Repository for video containers.
///
/// Reads return the document's version token; finalize steps pass it back as
/// a write precondition so a concurrently superseded container fails the
/// commit instead of being overwritten.
#[derive(Clone)]
pub struct ContainerStore {
    db: Arc<dyn Datastore>,
}

impl ContainerStore {
    pub fn new(db: Arc<dyn Datastore>) -> Self {
        Self { db }
    }

    /// Get a container and its version token.
    pub async fn get(&self, id: &ContainerId) -> StoreResult<Option<(VideoContainer, String)>> {
        match self.db.get(CONTAINERS, id.as_str()).await? {
            Some(doc) => {
                let container: VideoContainer = serde_json::from_value(doc.data)?;
                Ok(Some((container, doc.version)))
            }
            None => Ok(None),
        }
    }

    /// Get a container, failing with `NotFound` when absent.
    pub async fn get_required(&self, id: &ContainerId) -> StoreResult<(VideoContainer, String)> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("{CONTAINERS}/{id}")))
    }

    /// Create a fresh container record.
    pub async fn create(&self, container: &VideoContainer) -> StoreResult<()> {
        self.db
            .batch_write(vec![WriteOp::put(
                CONTAINERS,
                container.container_id.as_str(),
                serde_json::to_value(container)?,
                Precondition::Exists(false),
            )])
            .await?;
        info!(container_id = %container.container_id, "Created container record");
        Ok(())
    }

    /// Build a conditional replacement write for a finalize batch.
    pub fn update_write(container: &VideoContainer, version: &str) -> StoreResult<WriteOp> {
        Ok(WriteOp::put(
            CONTAINERS,
            container.container_id.as_str(),
            serde_json::to_value(container)?,
            Precondition::Version(version.to_string()),
        ))
    }

    /// Conditionally replace a container outside a larger batch.
    pub async fn update(&self, container: &VideoContainer, version: &str) -> StoreResult<()> {
        self.db
            .batch_write(vec![Self::update_write(container, version)?])
            .await
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
    async fn create_get_update_cycle() {
        let db: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let store = ContainerStore::new(db);

        let container = VideoContainer::new(ContainerId::from_string("c1"));
        store.create(&container).await.unwrap();

        let (mut fetched, version) = store.get_required(&container.container_id).await.unwrap();
        assert_eq!(fetched, container);

        fetched.begin_writing();
        store.update(&fetched, &version).await.unwrap();

        // Stale version is rejected after the update.
        let err = store.update(&fetched, &version).await.unwrap_err();
        assert!(err.is_precondition_failed());
    }

    #[tokio::test]
    async fn create_twice_fails() {
        let db: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let store = ContainerStore::new(db);

        let container = VideoContainer::new(ContainerId::from_string("c1"));
        store.create(&container).await.unwrap();
        assert!(store.create(&container).await.is_err());
    }
}
