//! Transcoder seam: probing inputs and packaging them into HLS track
//! directories.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::{probe_media, MediaProbe};

/// Filename of the per-track media playlist inside each track directory.
pub const TRACK_PLAYLIST_FILENAME: &str = "playlist.m3u8";

/// Segment filename pattern inside each track directory.
const SEGMENT_PATTERN: &str = "seg_%05d.ts";

/// One output track of an HLS packaging run.
#[derive(Debug, Clone)]
pub struct TrackOutput {
    /// FFmpeg stream selector relative to the input, e.g. "v:0" or "a:1"
    pub stream_selector: String,
    /// Directory name (under the plan's output root) to fill with
    /// segments plus a playlist
    pub dirname: String,
}

/// A full packaging plan for one input file.
#[derive(Debug, Clone)]
pub struct HlsPlan {
    /// Local directory to create track directories under
    pub output_root: PathBuf,
    /// Output tracks, one directory each
    pub tracks: Vec<TrackOutput>,
}

/// Probes inputs and packages them into segmented HLS track directories.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Inspect an input file's streams and duration.
    async fn probe(&self, input: &Path) -> MediaResult<MediaProbe>;

    /// Package the input into one HLS directory per planned track.
    async fn format_hls(&self, input: &Path, plan: &HlsPlan) -> MediaResult<()>;
}

/// FFmpeg-backed transcoder. Streams are copied, not re-encoded; codec
/// validation happens before packaging.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    segment_seconds: u32,
    timeout_secs: u64,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            segment_seconds: 6,
            timeout_secs: 1800,
        }
    }
}

impl FfmpegTranscoder {
    pub fn new(segment_seconds: u32, timeout_secs: u64) -> Self {
        Self {
            segment_seconds,
            timeout_secs,
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe(&self, input: &Path) -> MediaResult<MediaProbe> {
        probe_media(input).await
    }

    async fn format_hls(&self, input: &Path, plan: &HlsPlan) -> MediaResult<()> {
        let runner = FfmpegRunner::new().with_timeout(self.timeout_secs);

        for track in &plan.tracks {
            let track_dir = plan.output_root.join(&track.dirname);
            tokio::fs::create_dir_all(&track_dir).await?;

            let cmd = FfmpegCommand::new(input, track_dir.join(TRACK_PLAYLIST_FILENAME))
                .map_stream(&track.stream_selector)
                .copy_codecs()
                .hls_vod(self.segment_seconds, track_dir.join(SEGMENT_PATTERN));

            info!(
                stream = %track.stream_selector,
                dir = %track.dirname,
                "Packaging HLS track"
            );
            runner.run(&cmd).await?;
        }

        Ok(())
    }
}
