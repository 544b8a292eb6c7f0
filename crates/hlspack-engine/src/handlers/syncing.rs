//! Syncing stage: publish the new playlist version downstream, then settle
//! the container and schedule superseded objects for deletion.

use std::sync::Arc;

use async_trait::async_trait;

use hlspack_datastore::{ContainerStore, TaskStore};
use hlspack_models::{
    MasterPlaylistState, PublishContainerRequest, PublishedTrack, TaskKey, TaskKind,
    VideoContainer,
};

use crate::context::EngineContext;
use crate::engine::TaskHandler;
use crate::error::{conflict_on_precondition, EngineError, EngineResult};
use crate::handlers::{container_version_key, read_container};

/// Handler for the syncing stage.
pub struct SyncingHandler {
    ctx: Arc<EngineContext>,
}

impl SyncingHandler {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Debug)]
struct SyncingState {
    r2_filename: String,
    files_to_delete: Vec<String>,
    dirs_to_delete: Vec<String>,
}

fn expect_syncing(container: &VideoContainer, version: u64) -> EngineResult<SyncingState> {
    match &container.master_playlist {
        MasterPlaylistState::Syncing {
            version: current,
            r2_filename,
            r2_files_to_delete,
            r2_dirs_to_delete,
        } if *current == version => Ok(SyncingState {
            r2_filename: r2_filename.clone(),
            files_to_delete: r2_files_to_delete.clone(),
            dirs_to_delete: r2_dirs_to_delete.clone(),
        }),
        other => Err(EngineError::conflict(format!(
            "container {} syncing fence moved: expected v{version}, found v{}",
            container.container_id,
            other.version()
        ))),
    }
}

fn publish_request(
    container: &VideoContainer,
    version: u64,
    master_playlist_filename: &str,
) -> PublishContainerRequest {
    let video = container.video_tracks.iter().find_map(|t| t.effective());

    PublishContainerRequest {
        container_id: container.container_id.clone(),
        version,
        r2_root_dirname: container.r2_root_dirname.clone(),
        master_playlist_filename: master_playlist_filename.to_string(),
        duration_sec: video.map(|v| v.duration_sec).unwrap_or(0.0),
        resolution: video.map(|v| v.resolution.clone()).unwrap_or_default(),
        audio_tracks: container
            .audio_tracks
            .iter()
            .filter_map(|t| t.effective())
            .map(|d| PublishedTrack {
                name: d.name.clone(),
                is_default: d.is_default,
            })
            .collect(),
        subtitle_tracks: container
            .subtitle_tracks
            .iter()
            .filter_map(|t| t.effective())
            .map(|d| PublishedTrack {
                name: d.name.clone(),
                is_default: d.is_default,
            })
            .collect(),
    }
}

#[async_trait]
impl TaskHandler for SyncingHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Syncing
    }

    async fn process(&self, key: &TaskKey) -> EngineResult<()> {
        let ctx = &self.ctx;
        let (container_id, version) = container_version_key(key)?;
        let (container, _) = read_container(ctx, container_id).await?;
        let syncing = expect_syncing(&container, version)?;

        let request = publish_request(&container, version, &syncing.r2_filename);
        ctx.publisher.publish(&request).await?;

        // Fencing re-check before settling; the publish is idempotent per
        // version downstream, so a duplicate delivery just repeats it.
        let (mut fresh, fresh_version) = read_container(ctx, container_id).await?;
        let syncing = expect_syncing(&fresh, version)?;
        fresh.master_playlist = MasterPlaylistState::Synced {
            version,
            r2_filename: Some(syncing.r2_filename.clone()),
        };

        let root = &fresh.r2_root_dirname;
        let mut obsolete: Vec<String> = syncing
            .files_to_delete
            .iter()
            .map(|f| format!("{root}/{f}"))
            .collect();
        obsolete.extend(syncing.dirs_to_delete.iter().map(|d| format!("{root}/{d}")));

        let mut writes = vec![
            ContainerStore::update_write(&fresh, &fresh_version)?,
            TaskStore::delete_write(TaskKind::Syncing, key),
        ];
        writes.extend(ctx.lifecycle.supersede_writes(&obsolete).await?);

        ctx.db
            .batch_write(writes)
            .await
            .map_err(|e| conflict_on_precondition(e, "finalize syncing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlspack_models::{ContainerId, Track, VideoTrackData};

    #[test]
    fn fence_mismatch_is_conflict() {
        let mut container = VideoContainer::new(ContainerId::from_string("c1"));
        container.master_playlist = MasterPlaylistState::Syncing {
            version: 3,
            r2_filename: "master-a.m3u8".to_string(),
            r2_files_to_delete: vec![],
            r2_dirs_to_delete: vec![],
        };

        assert!(expect_syncing(&container, 3).is_ok());
        assert!(expect_syncing(&container, 4).unwrap_err().is_conflict());
    }

    #[test]
    fn request_carries_effective_video_metadata() {
        let mut container = VideoContainer::new(ContainerId::from_string("c1"));
        container.video_tracks.push(Track::staged(
            "vid-a",
            VideoTrackData {
                duration_sec: 12.0,
                resolution: "1920x1080".to_string(),
                total_bytes: 1,
            },
        ));

        let request = publish_request(&container, 2, "master-a.m3u8");
        assert_eq!(request.version, 2);
        assert_eq!(request.duration_sec, 12.0);
        assert_eq!(request.resolution, "1920x1080");
        assert_eq!(request.master_playlist_filename, "master-a.m3u8");
    }
}
