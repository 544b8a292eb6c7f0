//! Garbage-collection tasks: physically delete staged inputs and serving
//! objects whose deletion window has arrived.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use hlspack_models::{TaskKey, TaskKind};

use crate::context::EngineContext;
use crate::engine::TaskHandler;
use crate::error::{EngineError, EngineResult};
use crate::handlers::container_file_key;
use crate::resources::ResourceLifecycle;

/// Deletes an uploaded input from the staging store.
pub struct GcsFileDeletingHandler {
    ctx: Arc<EngineContext>,
}

impl GcsFileDeletingHandler {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskHandler for GcsFileDeletingHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::GcsFileDeleting
    }

    async fn process(&self, key: &TaskKey) -> EngineResult<()> {
        let (_, gcs_filename) = container_file_key(key)?;

        let deleted = self
            .ctx
            .staging
            .delete_objects(&[gcs_filename.to_string()])
            .await?;
        self.ctx.tasks.delete(TaskKind::GcsFileDeleting, key).await?;

        info!(file = %gcs_filename, deleted, "Deleted staged input");
        Ok(())
    }
}

/// Deletes serving-store objects under a registered key and releases the
/// registry pairing.
pub struct R2KeyDeletingHandler {
    ctx: Arc<EngineContext>,
}

impl R2KeyDeletingHandler {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskHandler for R2KeyDeletingHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::R2KeyDeleting
    }

    async fn process(&self, key: &TaskKey) -> EngineResult<()> {
        let TaskKey::StorageKey { key: storage_key } = key else {
            return Err(EngineError::conflict(format!(
                "expected storage key, got {key}"
            )));
        };

        // A registered key is either an exact object key or a directory
        // prefix; listing covers both.
        let objects = self.ctx.serving.list_keys(storage_key).await?;
        if !objects.is_empty() {
            self.ctx.serving.delete_objects(&objects).await?;
        }

        // Registry row and deletion task row leave together, only after the
        // bytes are gone.
        self.ctx
            .db
            .batch_write(ResourceLifecycle::release_writes(storage_key))
            .await?;

        info!(key = %storage_key, objects = objects.len(), "Released storage key");
        Ok(())
    }
}
