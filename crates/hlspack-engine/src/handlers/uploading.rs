//! Uploading stage: watch a staged upload until it completes, then advance
//! the container to formatting.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use hlspack_datastore::{ContainerStore, TaskStore};
use hlspack_models::{FailureReason, Task, TaskKey, TaskKind};

use crate::context::EngineContext;
use crate::engine::TaskHandler;
use crate::error::{conflict_on_precondition, EngineError, EngineResult};
use crate::handlers::{container_file_key, finalize_domain_failure, read_container, StageKind};

/// Handler for the media/subtitle uploading stages.
///
/// The client uploads directly to the staging store; this task polls the
/// staged object until it reaches its declared size, fails the upload when
/// the deadline passes or the size limit is exceeded, and otherwise
/// advances the container to the formatting stage.
pub struct UploadingHandler<K: StageKind> {
    ctx: Arc<EngineContext>,
    _kind: PhantomData<K>,
}

impl<K: StageKind> UploadingHandler<K> {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            ctx,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<K: StageKind> TaskHandler for UploadingHandler<K> {
    fn kind(&self) -> TaskKind {
        K::UPLOADING_KIND
    }

    async fn process(&self, key: &TaskKey) -> EngineResult<()> {
        let (container_id, gcs_filename) = container_file_key(key)?;
        let (container, version) = read_container(&self.ctx, container_id).await?;

        let uploading = K::uploading_state(&container)
            .filter(|u| u.gcs_filename == gcs_filename)
            .ok_or_else(|| {
                EngineError::conflict(format!(
                    "container {container_id} is no longer uploading {gcs_filename}"
                ))
            })?
            .clone();

        let max_bytes = self.ctx.config.max_upload_bytes;
        if uploading.content_length > max_bytes {
            return finalize_domain_failure(
                &self.ctx,
                &container,
                &version,
                K::UPLOADING_KIND,
                key,
                vec![FailureReason::UploadTooLarge],
            )
            .await;
        }

        let observed = self.ctx.staging.head(gcs_filename).await?;
        match observed {
            Some(size) if size > max_bytes => {
                finalize_domain_failure(
                    &self.ctx,
                    &container,
                    &version,
                    K::UPLOADING_KIND,
                    key,
                    vec![FailureReason::UploadTooLarge],
                )
                .await
            }
            Some(size) if size >= uploading.content_length => {
                // Upload complete: swap the uploading task for a formatting
                // task in the same batch that advances the container.
                let mut updated = container.clone();
                K::set_formatting(&mut updated, gcs_filename.to_string());

                let writes = vec![
                    ContainerStore::update_write(&updated, &version)?,
                    TaskStore::delete_write(K::UPLOADING_KIND, key),
                    TaskStore::insert_write(&Task::immediate(K::FORMATTING_KIND, key.clone()))?,
                ];
                self.ctx
                    .db
                    .batch_write(writes)
                    .await
                    .map_err(|e| conflict_on_precondition(e, "advance to formatting"))?;

                debug!(container_id = %container_id, file = %gcs_filename, "Upload complete, formatting scheduled");
                Ok(())
            }
            _ => {
                let deadline =
                    uploading.created_time + chrono::Duration::from_std(self.ctx.config.upload_deadline)
                        .unwrap_or_else(|_| chrono::Duration::hours(24));
                if Utc::now() > deadline {
                    finalize_domain_failure(
                        &self.ctx,
                        &container,
                        &version,
                        K::UPLOADING_KIND,
                        key,
                        vec![FailureReason::UploadIncomplete],
                    )
                    .await
                } else {
                    // Leave the task row in place; the next lease cycle
                    // checks again.
                    Err(EngineError::reschedule(format!(
                        "upload {gcs_filename} still in progress"
                    )))
                }
            }
        }
    }
}
