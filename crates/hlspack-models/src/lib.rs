//! Shared data models for the HlsPack backend.
//!
//! This crate provides Serde-serializable types for:
//! - Video containers, their processing state machine and master playlist state
//! - Tracks with committed and staged data
//! - Durable task rows (kind, key, retry schedule)
//! - Downstream publish payloads

pub mod container;
pub mod publish;
pub mod task;
pub mod track;

// Re-export common types
pub use container::{
    ContainerId, FailureReason, FormattingState, MasterPlaylistState, ProcessingState,
    UploadingState, VideoContainer,
};
pub use publish::{PublishContainerRequest, PublishedTrack};
pub use task::{Task, TaskKey, TaskKind};
pub use track::{AudioTrackData, StagedChange, SubtitleTrackData, Track, VideoTrackData};
