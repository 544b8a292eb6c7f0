//! Formatting stages: turn a staged upload into HLS track directories and
//! stage the new tracks on the container.
//!
//! Both handlers follow the same protocol: validate the payload before any
//! durable write, reserve fresh storage keys, run the external work under a
//! keep-alive lease, then finalize in one conditional batch that re-checks
//! the fencing token. A failed attempt rolls its reserved keys back to
//! near-term GC; its half-written objects are swept with them.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use hlspack_datastore::{ContainerStore, TaskStore};
use hlspack_media::{
    subtitle_media_playlist, HlsPlan, TrackOutput, TRACK_PLAYLIST_FILENAME,
};
use hlspack_models::{
    AudioTrackData, FailureReason, SubtitleTrackData, Task, TaskKey, TaskKind, Track,
    VideoTrackData,
};
use hlspack_storage::upload_dir;

use crate::context::EngineContext;
use crate::engine::TaskHandler;
use crate::error::{conflict_on_precondition, EngineError, EngineResult};
use crate::handlers::{
    container_file_key, finalize_domain_failure, read_container, MediaStage, StageKind,
    SubtitleStage,
};
use crate::keepalive::KeepAlive;

/// Tracks produced by one formatting run, keyed by their fresh directory
/// names.
#[derive(Debug, Default)]
struct StagedTracks {
    video: Option<(String, VideoTrackData)>,
    audios: Vec<(String, AudioTrackData)>,
    subtitle: Option<(String, SubtitleTrackData)>,
}

/// Finalize a successful formatting run in one conditional batch: append the
/// staged tracks, clear `processing`, advance the master playlist to a new
/// writing version, swap this task for the writing task, pin the reserved
/// keys far out, and schedule the uploaded input for deletion.
async fn finalize_formatting<K: StageKind>(
    ctx: &EngineContext,
    key: &TaskKey,
    reserved: &[String],
    staged: StagedTracks,
) -> EngineResult<()> {
    let (container_id, gcs_filename) = container_file_key(key)?;

    // Re-read: the fencing check must run against current state.
    let (mut fresh, fresh_version) = read_container(ctx, container_id).await?;
    let still_ours = K::formatting_state(&fresh)
        .map(|f| f.gcs_filename == gcs_filename)
        .unwrap_or(false);
    if !still_ours {
        return Err(EngineError::conflict(format!(
            "container {container_id} is no longer formatting {gcs_filename}"
        )));
    }

    fresh.processing = None;
    fresh.last_processing_failures.clear();
    if let Some((dirname, data)) = staged.video {
        fresh.video_tracks.push(Track::staged(dirname, data));
    }
    for (dirname, data) in staged.audios {
        fresh.audio_tracks.push(Track::staged(dirname, data));
    }
    if let Some((dirname, data)) = staged.subtitle {
        fresh.subtitle_tracks.push(Track::staged(dirname, data));
    }
    let new_version = fresh.begin_writing();

    let mut writes = vec![
        ContainerStore::update_write(&fresh, &fresh_version)?,
        TaskStore::delete_write(K::FORMATTING_KIND, key),
        TaskStore::insert_write(&Task::immediate(
            TaskKind::WritingToFile,
            TaskKey::container_version(container_id.clone(), new_version),
        ))?,
        TaskStore::insert_write(&Task::immediate(TaskKind::GcsFileDeleting, key.clone()))?,
    ];
    writes.extend(ctx.lifecycle.confirm_writes(reserved).await?);

    ctx.db
        .batch_write(writes)
        .await
        .map_err(|e| conflict_on_precondition(e, "finalize formatting"))
}

/// Run `work` with reserved keys and a keep-alive lease; on any error the
/// keys are rolled back to near-term GC before the error propagates.
async fn with_reservation<F, Fut>(
    ctx: &Arc<EngineContext>,
    kind: TaskKind,
    key: &TaskKey,
    reserved: &[String],
    work: F,
) -> EngineResult<()>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = EngineResult<()>>,
{
    ctx.lifecycle.reserve(reserved).await?;

    let lease = chrono::Duration::from_std(ctx.config.keepalive_lease)
        .unwrap_or_else(|_| chrono::Duration::minutes(10));
    let keepalive = KeepAlive::spawn(
        ctx.tasks.clone(),
        kind,
        key.clone(),
        ctx.config.keepalive_interval,
        lease,
    );

    let result = work().await;
    keepalive.stop().await;

    if result.is_err() {
        if let Err(e) = ctx.lifecycle.rollback(reserved).await {
            // The far-future safety net still covers these keys.
            warn!(key = %key, "Rollback of reserved keys failed: {e}");
        }
    }
    result
}

async fn prepare_workdir(ctx: &EngineContext) -> EngineResult<tempfile::TempDir> {
    tokio::fs::create_dir_all(&ctx.config.work_dir).await?;
    Ok(tempfile::tempdir_in(&ctx.config.work_dir)?)
}

/// Handler for the media formatting stage.
pub struct MediaFormattingHandler {
    ctx: Arc<EngineContext>,
}

impl MediaFormattingHandler {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    fn validate(
        &self,
        probe: &hlspack_media::MediaProbe,
    ) -> Vec<FailureReason> {
        let mut reasons = Vec::new();

        let videos: Vec<_> = probe.video_streams().collect();
        if videos.len() > 1 {
            reasons.push(FailureReason::MoreThanOneVideoTrack);
        }
        if videos.first().map(|v| v.codec != "h264").unwrap_or(true) {
            reasons.push(FailureReason::VideoCodecRequiresH264);
        }

        let audios: Vec<_> = probe.audio_streams().collect();
        if audios.len() > self.ctx.config.max_audio_tracks {
            reasons.push(FailureReason::TooManyAudioTracks);
        }
        if audios.iter().any(|a| a.codec != "aac") {
            reasons.push(FailureReason::AudioCodecRequiresAac);
        }

        reasons
    }
}

#[async_trait]
impl TaskHandler for MediaFormattingHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::MediaFormatting
    }

    async fn process(&self, key: &TaskKey) -> EngineResult<()> {
        let ctx = &self.ctx;
        let (container_id, gcs_filename) = container_file_key(key)?;
        let (container, version) = read_container(ctx, container_id).await?;

        MediaStage::formatting_state(&container)
            .filter(|f| f.gcs_filename == gcs_filename)
            .ok_or_else(|| {
                EngineError::conflict(format!(
                    "container {container_id} is no longer formatting {gcs_filename}"
                ))
            })?;

        let workdir = prepare_workdir(ctx).await?;
        let input = workdir.path().join("input");
        ctx.staging.download_file(gcs_filename, &input).await?;

        let probe = ctx.transcoder.probe(&input).await?;
        let reasons = self.validate(&probe);
        if !reasons.is_empty() {
            return finalize_domain_failure(
                ctx,
                &container,
                &version,
                TaskKind::MediaFormatting,
                key,
                reasons,
            )
            .await;
        }

        // Fresh directory names per attempt: duplicate executions can never
        // collide on a storage path; the loser's output is orphaned and
        // swept by GC.
        let video_dirname = format!("vid-{}", Uuid::new_v4());
        let audio_streams: Vec<_> = probe.audio_streams().cloned().collect();
        let audio_dirnames: Vec<String> = audio_streams
            .iter()
            .map(|_| format!("aud-{}", Uuid::new_v4()))
            .collect();

        let root = container.r2_root_dirname.clone();
        let mut reserved = vec![format!("{root}/{video_dirname}")];
        reserved.extend(audio_dirnames.iter().map(|d| format!("{root}/{d}")));

        let mut plan_tracks = vec![TrackOutput {
            stream_selector: "v:0".to_string(),
            dirname: video_dirname.clone(),
        }];
        plan_tracks.extend(audio_streams.iter().zip(&audio_dirnames).map(
            |(stream, dirname)| TrackOutput {
                stream_selector: format!("a:{}", stream.type_index),
                dirname: dirname.clone(),
            },
        ));
        let plan = HlsPlan {
            output_root: workdir.path().to_path_buf(),
            tracks: plan_tracks,
        };

        let container_has_audio = container
            .audio_tracks
            .iter()
            .any(|t| t.effective().is_some());

        with_reservation(ctx, TaskKind::MediaFormatting, key, &reserved, || async {
            ctx.transcoder.format_hls(&input, &plan).await?;

            let video_bytes = upload_dir(
                ctx.serving.as_ref(),
                &workdir.path().join(&video_dirname),
                &format!("{root}/{video_dirname}"),
            )
            .await?;

            let mut staged = StagedTracks {
                video: Some((
                    video_dirname.clone(),
                    VideoTrackData {
                        duration_sec: probe.duration_sec,
                        resolution: probe.resolution().unwrap_or_default(),
                        total_bytes: video_bytes,
                    },
                )),
                ..Default::default()
            };

            for (i, (stream, dirname)) in audio_streams.iter().zip(&audio_dirnames).enumerate() {
                let audio_bytes = upload_dir(
                    ctx.serving.as_ref(),
                    &workdir.path().join(dirname),
                    &format!("{root}/{dirname}"),
                )
                .await?;
                staged.audios.push((
                    dirname.clone(),
                    AudioTrackData {
                        name: stream.display_name(&format!("Audio {}", i + 1)),
                        is_default: i == 0 && !container_has_audio,
                        total_bytes: audio_bytes,
                    },
                ));
            }

            finalize_formatting::<MediaStage>(ctx, key, &reserved, staged).await
        })
        .await
    }
}

/// Handler for the subtitle formatting stage.
pub struct SubtitleFormattingHandler {
    ctx: Arc<EngineContext>,
}

impl SubtitleFormattingHandler {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskHandler for SubtitleFormattingHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::SubtitleFormatting
    }

    async fn process(&self, key: &TaskKey) -> EngineResult<()> {
        let ctx = &self.ctx;
        let (container_id, gcs_filename) = container_file_key(key)?;
        let (container, version) = read_container(ctx, container_id).await?;

        SubtitleStage::formatting_state(&container)
            .filter(|f| f.gcs_filename == gcs_filename)
            .ok_or_else(|| {
                EngineError::conflict(format!(
                    "container {container_id} is no longer formatting {gcs_filename}"
                ))
            })?;

        let existing_subtitles = container
            .subtitle_tracks
            .iter()
            .filter(|t| t.effective().is_some())
            .count();
        if existing_subtitles >= ctx.config.max_subtitle_tracks {
            return finalize_domain_failure(
                ctx,
                &container,
                &version,
                TaskKind::SubtitleFormatting,
                key,
                vec![FailureReason::TooManySubtitleTracks],
            )
            .await;
        }

        let workdir = prepare_workdir(ctx).await?;
        let archive = workdir.path().join("input.vtt.gz");
        ctx.staging.download_file(gcs_filename, &archive).await?;

        let dirname = format!("sub-{}", Uuid::new_v4());
        let local_dir = workdir.path().join(&dirname);
        tokio::fs::create_dir_all(&local_dir).await?;

        let total_bytes = match hlspack_media::unpack_webvtt(
            &archive,
            &local_dir.join("subtitles.vtt"),
        )
        .await
        {
            Ok(bytes) => bytes,
            Err(e) => match e.validation_reason() {
                Some(reason) => {
                    return finalize_domain_failure(
                        ctx,
                        &container,
                        &version,
                        TaskKind::SubtitleFormatting,
                        key,
                        vec![reason],
                    )
                    .await;
                }
                None => return Err(e.into()),
            },
        };

        // The subtitle media playlist spans the video's duration.
        let duration_sec = container
            .video_tracks
            .iter()
            .find_map(|t| t.effective())
            .map(|v| v.duration_sec)
            .unwrap_or(0.0);
        let playlist = subtitle_media_playlist(duration_sec, "subtitles.vtt");
        tokio::fs::write(local_dir.join(TRACK_PLAYLIST_FILENAME), &playlist).await?;

        let root = container.r2_root_dirname.clone();
        let reserved = vec![format!("{root}/{dirname}")];
        let is_default = existing_subtitles == 0;
        let name = subtitle_name(gcs_filename);

        with_reservation(ctx, TaskKind::SubtitleFormatting, key, &reserved, || async {
            let uploaded = upload_dir(
                ctx.serving.as_ref(),
                &local_dir,
                &format!("{root}/{dirname}"),
            )
            .await?;

            let staged = StagedTracks {
                subtitle: Some((
                    dirname.clone(),
                    SubtitleTrackData {
                        name: name.clone(),
                        is_default,
                        total_bytes: uploaded.max(total_bytes),
                    },
                )),
                ..Default::default()
            };
            finalize_formatting::<SubtitleStage>(ctx, key, &reserved, staged).await
        })
        .await
    }
}

/// Display name for a subtitle track, from the uploaded filename.
fn subtitle_name(gcs_filename: &str) -> String {
    let base = Path::new(gcs_filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| gcs_filename.to_string());
    base.trim_end_matches(".gz")
        .trim_end_matches(".vtt")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtitle_name_strips_extensions() {
        assert_eq!(subtitle_name("english.vtt.gz"), "english");
        assert_eq!(subtitle_name("uploads/forced.vtt"), "forced");
        assert_eq!(subtitle_name("plain"), "plain");
    }
}
