//! Durable task rows.
//!
//! A task row exists iff its unit of work is still pending. Its absence is
//! load-bearing: other code paths check for row existence to decide whether
//! work remains.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::container::ContainerId;

/// Kind of background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    MediaUploading,
    MediaFormatting,
    SubtitleUploading,
    SubtitleFormatting,
    WritingToFile,
    Syncing,
    GcsFileDeleting,
    R2KeyDeleting,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::MediaUploading => "media_uploading",
            TaskKind::MediaFormatting => "media_formatting",
            TaskKind::SubtitleUploading => "subtitle_uploading",
            TaskKind::SubtitleFormatting => "subtitle_formatting",
            TaskKind::WritingToFile => "writing_to_file",
            TaskKind::Syncing => "syncing",
            TaskKind::GcsFileDeleting => "gcs_file_deleting",
            TaskKind::R2KeyDeleting => "r2_key_deleting",
        }
    }

    /// All task kinds, in dispatch order.
    pub fn all() -> &'static [TaskKind] {
        &[
            TaskKind::MediaUploading,
            TaskKind::MediaFormatting,
            TaskKind::SubtitleUploading,
            TaskKind::SubtitleFormatting,
            TaskKind::WritingToFile,
            TaskKind::Syncing,
            TaskKind::GcsFileDeleting,
            TaskKind::R2KeyDeleting,
        ]
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite identifier of a task, specific to its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKey {
    /// Keyed by container alone.
    Container { container_id: ContainerId },
    /// Keyed by container + staged upload filename (uploading/formatting).
    ContainerFile {
        container_id: ContainerId,
        gcs_filename: String,
    },
    /// Keyed by container + master playlist version (writing/syncing).
    ContainerVersion {
        container_id: ContainerId,
        version: u64,
    },
    /// Keyed by a storage object key or prefix (GC tasks).
    StorageKey { key: String },
}

impl TaskKey {
    pub fn container_file(container_id: ContainerId, gcs_filename: impl Into<String>) -> Self {
        Self::ContainerFile {
            container_id,
            gcs_filename: gcs_filename.into(),
        }
    }

    pub fn container_version(container_id: ContainerId, version: u64) -> Self {
        Self::ContainerVersion {
            container_id,
            version,
        }
    }

    pub fn storage_key(key: impl Into<String>) -> Self {
        Self::StorageKey { key: key.into() }
    }

    /// Container this key belongs to, if any.
    pub fn container_id(&self) -> Option<&ContainerId> {
        match self {
            TaskKey::Container { container_id }
            | TaskKey::ContainerFile { container_id, .. }
            | TaskKey::ContainerVersion { container_id, .. } => Some(container_id),
            TaskKey::StorageKey { .. } => None,
        }
    }

    /// Stable document ID for this key. Storage keys are percent-encoded
    /// because they may contain `/`.
    pub fn doc_id(&self) -> String {
        match self {
            TaskKey::Container { container_id } => container_id.to_string(),
            TaskKey::ContainerFile {
                container_id,
                gcs_filename,
            } => format!("{}:{}", container_id, urlencoding::encode(gcs_filename)),
            TaskKey::ContainerVersion {
                container_id,
                version,
            } => format!("{}:v{}", container_id, version),
            TaskKey::StorageKey { key } => urlencoding::encode(key).into_owned(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.doc_id())
    }
}

/// One pending unit of background work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    /// Task kind
    pub kind: TaskKind,

    /// Composite key
    pub key: TaskKey,

    /// Number of claims so far
    #[serde(default)]
    pub retry_count: u32,

    /// Next time at or after which the task is eligible for (re-)claim
    pub execution_time: DateTime<Utc>,

    /// Immutable creation timestamp
    pub created_time: DateTime<Utc>,
}

impl Task {
    /// Create a task eligible at `execution_time`.
    pub fn new(kind: TaskKind, key: TaskKey, execution_time: DateTime<Utc>) -> Self {
        Self {
            kind,
            key,
            retry_count: 0,
            execution_time,
            created_time: Utc::now(),
        }
    }

    /// Create a task eligible immediately.
    pub fn immediate(kind: TaskKind, key: TaskKey) -> Self {
        Self::new(kind, key, Utc::now())
    }

    /// Whether the task is eligible for claim at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.execution_time <= now
    }
}
