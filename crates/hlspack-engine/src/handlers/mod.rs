//! Task handlers, one per task kind.

pub mod formatting;
pub mod gc;
pub mod kinds;
pub mod syncing;
pub mod uploading;
pub mod writing_to_file;

pub use formatting::{MediaFormattingHandler, SubtitleFormattingHandler};
pub use gc::{GcsFileDeletingHandler, R2KeyDeletingHandler};
pub use kinds::{MediaStage, StageKind, SubtitleStage};
pub use syncing::SyncingHandler;
pub use uploading::UploadingHandler;
pub use writing_to_file::WritingToFileHandler;

use tracing::warn;

use hlspack_datastore::{ContainerStore, TaskStore};
use hlspack_models::{ContainerId, FailureReason, Task, TaskKey, TaskKind, VideoContainer};

use crate::context::EngineContext;
use crate::error::{conflict_on_precondition, EngineError, EngineResult};

/// Read a container, failing with a terminal `NotFound` when it is gone.
pub(crate) async fn read_container(
    ctx: &EngineContext,
    id: &ContainerId,
) -> EngineResult<(VideoContainer, String)> {
    ctx.containers
        .get(id)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("container {id}")))
}

/// Terminal finalize for a domain rejection: clear `processing`, record the
/// failure reasons, delete this stage's task row, and schedule the uploaded
/// input for deletion. One conditional batch; supersession surfaces as
/// `Conflict`.
pub(crate) async fn finalize_domain_failure(
    ctx: &EngineContext,
    container: &VideoContainer,
    container_version: &str,
    stage_kind: TaskKind,
    key: &TaskKey,
    reasons: Vec<FailureReason>,
) -> EngineResult<()> {
    warn!(
        container_id = %container.container_id,
        kind = %stage_kind,
        reasons = ?reasons,
        "Recording domain failure"
    );

    let mut updated = container.clone();
    updated.processing = None;
    updated.last_processing_failures = reasons;

    let writes = vec![
        ContainerStore::update_write(&updated, container_version)?,
        TaskStore::delete_write(stage_kind, key),
        TaskStore::insert_write(&Task::immediate(TaskKind::GcsFileDeleting, key.clone()))?,
    ];
    ctx.db
        .batch_write(writes)
        .await
        .map_err(|e| conflict_on_precondition(e, "record domain failure"))
}

/// Extract the container-file parts of a task key or fail the attempt.
pub(crate) fn container_file_key(key: &TaskKey) -> EngineResult<(&ContainerId, &str)> {
    match key {
        TaskKey::ContainerFile {
            container_id,
            gcs_filename,
        } => Ok((container_id, gcs_filename)),
        other => Err(EngineError::conflict(format!(
            "expected container-file key, got {other}"
        ))),
    }
}

/// Extract the container-version parts of a task key or fail the attempt.
pub(crate) fn container_version_key(key: &TaskKey) -> EngineResult<(&ContainerId, u64)> {
    match key {
        TaskKey::ContainerVersion {
            container_id,
            version,
        } => Ok((container_id, *version)),
        other => Err(EngineError::conflict(format!(
            "expected container-version key, got {other}"
        ))),
    }
}
