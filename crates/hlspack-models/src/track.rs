//! Track types with committed and staged data.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A staged, not-yet-committed change to a track.
///
/// Stage handlers only ever append `ToAdd` entries; `ToChange` and `ToDelete`
/// are written by the commit operation that merges staged data into the
/// committed track lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum StagedChange<D> {
    ToAdd(D),
    ToChange(D),
    ToDelete,
}

/// One video/audio/subtitle stream of a container.
///
/// `committed` is the live data referenced by the current master playlist;
/// `staging` accumulates pending changes without racing on the committed data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Track<D> {
    /// Directory name under the container's root holding segments + playlist.
    pub r2_track_dirname: String,

    /// Live track data, if the track has been committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed: Option<D>,

    /// Pending staged change, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging: Option<StagedChange<D>>,
}

impl<D> Track<D> {
    /// Create a track whose data is staged for addition.
    pub fn staged(r2_track_dirname: impl Into<String>, data: D) -> Self {
        Self {
            r2_track_dirname: r2_track_dirname.into(),
            committed: None,
            staging: Some(StagedChange::ToAdd(data)),
        }
    }

    /// Data to reference from a freshly assembled master playlist:
    /// the staged addition if present, otherwise the committed data,
    /// unless the track is staged for deletion.
    pub fn effective(&self) -> Option<&D> {
        match &self.staging {
            Some(StagedChange::ToAdd(d)) | Some(StagedChange::ToChange(d)) => Some(d),
            Some(StagedChange::ToDelete) => None,
            None => self.committed.as_ref(),
        }
    }
}

/// Committed/staged data for a video track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoTrackData {
    /// Duration in seconds
    pub duration_sec: f64,
    /// Resolution as "WIDTHxHEIGHT"
    pub resolution: String,
    /// Total bytes of segments + playlist
    pub total_bytes: u64,
}

/// Committed/staged data for an audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioTrackData {
    /// Display name (language or label)
    pub name: String,
    /// Whether this track is the default selection
    pub is_default: bool,
    /// Total bytes of segments + playlist
    pub total_bytes: u64,
}

/// Committed/staged data for a subtitle track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubtitleTrackData {
    /// Display name (language or label)
    pub name: String,
    /// Whether this track is the default selection
    pub is_default: bool,
    /// Total bytes of the subtitle payload + playlist
    pub total_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_prefers_staged_addition() {
        let track = Track::staged(
            "dir-a",
            AudioTrackData {
                name: "en".to_string(),
                is_default: true,
                total_bytes: 10,
            },
        );
        assert_eq!(track.effective().map(|d| d.name.as_str()), Some("en"));
    }

    #[test]
    fn effective_skips_staged_deletion() {
        let track: Track<AudioTrackData> = Track {
            r2_track_dirname: "dir-a".to_string(),
            committed: Some(AudioTrackData {
                name: "en".to_string(),
                is_default: false,
                total_bytes: 10,
            }),
            staging: Some(StagedChange::ToDelete),
        };
        assert!(track.effective().is_none());
    }

    #[test]
    fn staged_change_round_trips_through_json() {
        let change = StagedChange::ToAdd(VideoTrackData {
            duration_sec: 12.5,
            resolution: "1920x1080".to_string(),
            total_bytes: 1024,
        });
        let json = serde_json::to_string(&change).unwrap();
        let back: StagedChange<VideoTrackData> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, change);
    }
}
