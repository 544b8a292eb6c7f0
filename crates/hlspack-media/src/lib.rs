//! FFmpeg-backed HLS packaging.
//!
//! Probing and segmentation shell out to `ffprobe`/`ffmpeg`; the
//! [`Transcoder`] trait is the seam tests fake out. Playlist assembly and
//! subtitle unpacking are pure and run in-process.

pub mod command;
pub mod error;
pub mod playlist;
pub mod probe;
pub mod subtitle;
pub mod transcoder;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use playlist::{master_playlist, subtitle_media_playlist, AltRendition, VideoRendition};
pub use probe::{probe_media, MediaProbe, StreamInfo, StreamKind};
pub use subtitle::unpack_webvtt;
pub use transcoder::{
    FfmpegTranscoder, HlsPlan, TrackOutput, Transcoder, TRACK_PLAYLIST_FILENAME,
};
