//! Downstream publish payloads.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::container::ContainerId;

/// One audio or subtitle track as seen by the downstream catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PublishedTrack {
    pub name: String,
    pub is_default: bool,
}

/// Request payload for the "publish container" RPC, invoked once per
/// syncing stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PublishContainerRequest {
    pub container_id: ContainerId,
    /// Master playlist version being published
    pub version: u64,
    /// Root directory in the serving store
    pub r2_root_dirname: String,
    /// Master playlist filename under the root directory
    pub master_playlist_filename: String,
    /// Duration of the primary video track in seconds
    pub duration_sec: f64,
    /// Resolution of the primary video track
    pub resolution: String,
    pub audio_tracks: Vec<PublishedTrack>,
    pub subtitle_tracks: Vec<PublishedTrack>,
}
