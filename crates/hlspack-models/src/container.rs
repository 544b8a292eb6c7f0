//! Video container aggregate and its processing state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::track::{AudioTrackData, SubtitleTrackData, Track, VideoTrackData};

/// Unique identifier for a video container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ContainerId(pub String);

impl ContainerId {
    /// Generate a new random container ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContainerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a pending upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UploadingState {
    /// Object name in the upload staging store
    pub gcs_filename: String,
    /// Resumable upload session URL handed to the client
    pub upload_session_url: String,
    /// Declared payload size in bytes
    pub content_length: u64,
    /// Creation timestamp of the session
    pub created_time: DateTime<Utc>,
}

/// State of a pending formatting stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormattingState {
    /// Object name in the upload staging store being formatted
    pub gcs_filename: String,
}

/// The active background stage of a container, if any.
///
/// Presence marks "a background task is the sole writer of this container
/// right now"; finalize steps must re-read and match the expected variant
/// before writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ProcessingState {
    MediaUploading(UploadingState),
    MediaFormatting(FormattingState),
    SubtitleUploading(UploadingState),
    SubtitleFormatting(FormattingState),
}

impl ProcessingState {
    pub fn stage_name(&self) -> &'static str {
        match self {
            ProcessingState::MediaUploading(_) => "media_uploading",
            ProcessingState::MediaFormatting(_) => "media_formatting",
            ProcessingState::SubtitleUploading(_) => "subtitle_uploading",
            ProcessingState::SubtitleFormatting(_) => "subtitle_formatting",
        }
    }
}

/// Master playlist lifecycle. `version` is a monotonically increasing fencing
/// token: a finalize step for version V must fail if the container has moved
/// past V.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MasterPlaylistState {
    /// The published playlist (if any) is live.
    Synced {
        version: u64,
        /// Filename of the live playlist; None before the first sync.
        #[serde(skip_serializing_if = "Option::is_none")]
        r2_filename: Option<String>,
    },
    /// A new playlist for `version` is being assembled and uploaded.
    WritingToFile {
        version: u64,
        /// Obsolete playlist files to delete once `version` is live.
        r2_files_to_delete: Vec<String>,
        /// Obsolete track directories to delete once `version` is live.
        r2_dirs_to_delete: Vec<String>,
    },
    /// The playlist for `version` is uploaded and being published downstream.
    Syncing {
        version: u64,
        r2_filename: String,
        r2_files_to_delete: Vec<String>,
        r2_dirs_to_delete: Vec<String>,
    },
}

impl MasterPlaylistState {
    pub fn version(&self) -> u64 {
        match self {
            MasterPlaylistState::Synced { version, .. }
            | MasterPlaylistState::WritingToFile { version, .. }
            | MasterPlaylistState::Syncing { version, .. } => *version,
        }
    }
}

/// Terminal, domain-level reasons a processing stage rejected its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    UploadIncomplete,
    UploadTooLarge,
    VideoCodecRequiresH264,
    AudioCodecRequiresAac,
    MoreThanOneVideoTrack,
    TooManyAudioTracks,
    TooManySubtitleTracks,
    SubtitleFormatInvalid,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::UploadIncomplete => "upload_incomplete",
            FailureReason::UploadTooLarge => "upload_too_large",
            FailureReason::VideoCodecRequiresH264 => "video_codec_requires_h264",
            FailureReason::AudioCodecRequiresAac => "audio_codec_requires_aac",
            FailureReason::MoreThanOneVideoTrack => "more_than_one_video_track",
            FailureReason::TooManyAudioTracks => "too_many_audio_tracks",
            FailureReason::TooManySubtitleTracks => "too_many_subtitle_tracks",
            FailureReason::SubtitleFormatInvalid => "subtitle_format_invalid",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The aggregate record representing one video's processing and publishing
/// state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoContainer {
    /// Container ID
    pub container_id: ContainerId,

    /// Root directory in the serving store under which every object of this
    /// container lives
    pub r2_root_dirname: String,

    /// Master playlist lifecycle state
    pub master_playlist: MasterPlaylistState,

    /// Active background stage, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing: Option<ProcessingState>,

    /// Domain failures recorded by the most recent rejected stage
    #[serde(default)]
    pub last_processing_failures: Vec<FailureReason>,

    /// Video tracks (committed and/or staged)
    #[serde(default)]
    pub video_tracks: Vec<Track<VideoTrackData>>,

    /// Audio tracks (committed and/or staged)
    #[serde(default)]
    pub audio_tracks: Vec<Track<AudioTrackData>>,

    /// Subtitle tracks (committed and/or staged)
    #[serde(default)]
    pub subtitle_tracks: Vec<Track<SubtitleTrackData>>,
}

impl VideoContainer {
    /// Create a fresh container with a new root directory.
    pub fn new(container_id: ContainerId) -> Self {
        Self {
            container_id,
            r2_root_dirname: Uuid::new_v4().to_string(),
            master_playlist: MasterPlaylistState::Synced {
                version: 0,
                r2_filename: None,
            },
            processing: None,
            last_processing_failures: Vec::new(),
            video_tracks: Vec::new(),
            audio_tracks: Vec::new(),
            subtitle_tracks: Vec::new(),
        }
    }

    /// Advance the master playlist to a new `WritingToFile` version.
    ///
    /// Supersedes any pending write or sync for an older version: files those
    /// attempts produced are folded into the deletion lists, and their tasks
    /// will fail their fencing check when they try to finalize. Returns the
    /// new version.
    pub fn begin_writing(&mut self) -> u64 {
        let (version, files, dirs) = match std::mem::replace(
            &mut self.master_playlist,
            MasterPlaylistState::Synced {
                version: 0,
                r2_filename: None,
            },
        ) {
            MasterPlaylistState::Synced {
                version,
                r2_filename,
            } => (version + 1, r2_filename.into_iter().collect(), Vec::new()),
            MasterPlaylistState::WritingToFile {
                version,
                r2_files_to_delete,
                r2_dirs_to_delete,
            } => (version + 1, r2_files_to_delete, r2_dirs_to_delete),
            MasterPlaylistState::Syncing {
                version,
                r2_filename,
                mut r2_files_to_delete,
                r2_dirs_to_delete,
            } => {
                // The half-synced playlist file becomes garbage once the new
                // version is live.
                r2_files_to_delete.push(r2_filename);
                (version + 1, r2_files_to_delete, r2_dirs_to_delete)
            }
        };

        self.master_playlist = MasterPlaylistState::WritingToFile {
            version,
            r2_files_to_delete: files,
            r2_dirs_to_delete: dirs,
        };
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_container_starts_synced_at_version_zero() {
        let c = VideoContainer::new(ContainerId::new());
        assert_eq!(c.master_playlist.version(), 0);
        assert!(c.processing.is_none());
        assert!(!c.r2_root_dirname.is_empty());
    }

    #[test]
    fn begin_writing_bumps_version_monotonically() {
        let mut c = VideoContainer::new(ContainerId::new());
        assert_eq!(c.begin_writing(), 1);
        assert_eq!(c.begin_writing(), 2);
        assert_eq!(c.master_playlist.version(), 2);
    }

    #[test]
    fn begin_writing_folds_superseded_sync_into_deletions() {
        let mut c = VideoContainer::new(ContainerId::new());
        c.master_playlist = MasterPlaylistState::Syncing {
            version: 3,
            r2_filename: "master-old.m3u8".to_string(),
            r2_files_to_delete: vec!["master-ancient.m3u8".to_string()],
            r2_dirs_to_delete: vec![],
        };

        let version = c.begin_writing();
        assert_eq!(version, 4);
        match &c.master_playlist {
            MasterPlaylistState::WritingToFile {
                r2_files_to_delete, ..
            } => {
                assert!(r2_files_to_delete.contains(&"master-old.m3u8".to_string()));
                assert!(r2_files_to_delete.contains(&"master-ancient.m3u8".to_string()));
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn container_round_trips_through_json() {
        let mut c = VideoContainer::new(ContainerId::from_string("c1"));
        c.processing = Some(ProcessingState::MediaFormatting(FormattingState {
            gcs_filename: "v.mp4".to_string(),
        }));
        c.video_tracks.push(Track::staged(
            "trk-1",
            VideoTrackData {
                duration_sec: 60.0,
                resolution: "1280x720".to_string(),
                total_bytes: 4096,
            },
        ));

        let json = serde_json::to_string(&c).unwrap();
        let back: VideoContainer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
