//! Writing-to-file stage: assemble a master playlist for one version and
//! upload it under a fresh filename.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use hlspack_datastore::{ContainerStore, TaskStore};
use hlspack_media::{master_playlist, AltRendition, VideoRendition};
use hlspack_models::{MasterPlaylistState, Task, TaskKey, TaskKind, VideoContainer};

use crate::context::EngineContext;
use crate::engine::TaskHandler;
use crate::error::{conflict_on_precondition, EngineError, EngineResult};
use crate::handlers::{container_version_key, read_container};

/// Handler for the writing-to-file stage.
pub struct WritingToFileHandler {
    ctx: Arc<EngineContext>,
}

impl WritingToFileHandler {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }
}

/// The writing state for `version`, or a fencing failure.
fn expect_writing(
    container: &VideoContainer,
    version: u64,
) -> EngineResult<(Vec<String>, Vec<String>)> {
    match &container.master_playlist {
        MasterPlaylistState::WritingToFile {
            version: current,
            r2_files_to_delete,
            r2_dirs_to_delete,
        } if *current == version => {
            Ok((r2_files_to_delete.clone(), r2_dirs_to_delete.clone()))
        }
        other => Err(EngineError::conflict(format!(
            "container {} writing fence moved: expected v{version}, found v{}",
            container.container_id,
            other.version()
        ))),
    }
}

/// Render the master playlist for the container's current effective tracks,
/// or `None` when there is no video track to reference yet.
fn render_master(container: &VideoContainer) -> Option<String> {
    let (video_dirname, video) = container
        .video_tracks
        .iter()
        .find_map(|t| t.effective().map(|d| (&t.r2_track_dirname, d)))?;

    let bandwidth = if video.duration_sec > 0.0 {
        ((video.total_bytes as f64 * 8.0) / video.duration_sec) as u64
    } else {
        0
    };

    let audios: Vec<AltRendition> = container
        .audio_tracks
        .iter()
        .filter_map(|t| {
            t.effective().map(|d| AltRendition {
                dirname: t.r2_track_dirname.clone(),
                name: d.name.clone(),
                is_default: d.is_default,
            })
        })
        .collect();
    let subtitles: Vec<AltRendition> = container
        .subtitle_tracks
        .iter()
        .filter_map(|t| {
            t.effective().map(|d| AltRendition {
                dirname: t.r2_track_dirname.clone(),
                name: d.name.clone(),
                is_default: d.is_default,
            })
        })
        .collect();

    Some(master_playlist(
        &VideoRendition {
            dirname: video_dirname.clone(),
            resolution: video.resolution.clone(),
            bandwidth,
        },
        &audios,
        &subtitles,
    ))
}

#[async_trait]
impl TaskHandler for WritingToFileHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::WritingToFile
    }

    async fn process(&self, key: &TaskKey) -> EngineResult<()> {
        let ctx = &self.ctx;
        let (container_id, version) = container_version_key(key)?;
        let (container, doc_version) = read_container(ctx, container_id).await?;
        let (files_to_delete, dirs_to_delete) = expect_writing(&container, version)?;

        let Some(playlist) = render_master(&container) else {
            // No video track yet (e.g. only subtitles were formatted):
            // nothing to publish, settle directly into synced and let the
            // deletion lists go out now.
            let mut updated = container.clone();
            updated.master_playlist = MasterPlaylistState::Synced {
                version,
                r2_filename: None,
            };

            let root = &container.r2_root_dirname;
            let mut obsolete: Vec<String> =
                files_to_delete.iter().map(|f| format!("{root}/{f}")).collect();
            obsolete.extend(dirs_to_delete.iter().map(|d| format!("{root}/{d}")));

            let mut writes = vec![
                ContainerStore::update_write(&updated, &doc_version)?,
                TaskStore::delete_write(TaskKind::WritingToFile, key),
            ];
            writes.extend(ctx.lifecycle.supersede_writes(&obsolete).await?);
            info!(container_id = %container_id, version, "No video track, settling without a playlist");
            return ctx
                .db
                .batch_write(writes)
                .await
                .map_err(|e| conflict_on_precondition(e, "settle without playlist"));
        };

        let root = container.r2_root_dirname.clone();
        let filename = format!("master-{}.m3u8", Uuid::new_v4());
        let storage_key = format!("{root}/{filename}");
        let reserved = vec![storage_key.clone()];

        ctx.lifecycle.reserve(&reserved).await?;

        let result = async {
            ctx.serving
                .upload_bytes(
                    playlist.into_bytes(),
                    &storage_key,
                    "application/vnd.apple.mpegurl",
                )
                .await?;

            // Fencing re-check against current state before committing.
            let (mut fresh, fresh_version) = read_container(ctx, container_id).await?;
            let (files, dirs) = expect_writing(&fresh, version)?;
            fresh.master_playlist = MasterPlaylistState::Syncing {
                version,
                r2_filename: filename.clone(),
                r2_files_to_delete: files,
                r2_dirs_to_delete: dirs,
            };

            let mut writes = vec![
                ContainerStore::update_write(&fresh, &fresh_version)?,
                TaskStore::delete_write(TaskKind::WritingToFile, key),
                TaskStore::insert_write(&Task::immediate(
                    TaskKind::Syncing,
                    TaskKey::container_version(container_id.clone(), version),
                ))?,
            ];
            writes.extend(ctx.lifecycle.confirm_writes(&reserved).await?);
            ctx.db
                .batch_write(writes)
                .await
                .map_err(|e| conflict_on_precondition(e, "finalize writing"))
        }
        .await;

        if result.is_err() {
            if let Err(e) = ctx.lifecycle.rollback(&reserved).await {
                warn!(key = %key, "Rollback of playlist key failed: {e}");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlspack_models::{AudioTrackData, ContainerId, Track, VideoTrackData};

    fn container_with_video() -> VideoContainer {
        let mut container = VideoContainer::new(ContainerId::from_string("c1"));
        container.video_tracks.push(Track::staged(
            "vid-a",
            VideoTrackData {
                duration_sec: 10.0,
                resolution: "1280x720".to_string(),
                total_bytes: 10_000_000,
            },
        ));
        container
    }

    #[test]
    fn render_references_effective_tracks() {
        let mut container = container_with_video();
        container.audio_tracks.push(Track::staged(
            "aud-a",
            AudioTrackData {
                name: "English".to_string(),
                is_default: true,
                total_bytes: 1_000,
            },
        ));

        let playlist = render_master(&container).unwrap();
        assert!(playlist.contains("vid-a/playlist.m3u8"));
        assert!(playlist.contains("URI=\"aud-a/playlist.m3u8\""));
        assert!(playlist.contains("BANDWIDTH=8000000"));
    }

    #[test]
    fn render_is_none_without_video() {
        let container = VideoContainer::new(ContainerId::from_string("c1"));
        assert!(render_master(&container).is_none());
    }

    #[test]
    fn fence_mismatch_is_conflict() {
        let mut container = container_with_video();
        container.begin_writing();
        assert!(expect_writing(&container, 1).is_ok());
        let err = expect_writing(&container, 2).unwrap_err();
        assert!(err.is_conflict());
    }
}
