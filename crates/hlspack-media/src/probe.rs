//! FFprobe stream inspection.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Probed information about an input file.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    /// Duration in seconds
    pub duration_sec: f64,
    /// All streams, in ffprobe order
    pub streams: Vec<StreamInfo>,
}

/// One stream of an input file.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Kind of stream
    pub kind: StreamKind,
    /// Index among streams of the same kind (the `0:a:N` selector index)
    pub type_index: usize,
    /// Codec name as reported by ffprobe
    pub codec: String,
    /// Width in pixels (video only)
    pub width: Option<u32>,
    /// Height in pixels (video only)
    pub height: Option<u32>,
    /// Language tag, if present
    pub language: Option<String>,
    /// Title tag, if present
    pub title: Option<String>,
}

impl StreamInfo {
    /// Display name for the stream: title, else language, else a fallback.
    pub fn display_name(&self, fallback: &str) -> String {
        self.title
            .clone()
            .or_else(|| self.language.clone())
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Other,
}

impl MediaProbe {
    pub fn video_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(|s| s.kind == StreamKind::Video)
    }

    pub fn audio_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(|s| s.kind == StreamKind::Audio)
    }

    /// Resolution of the first video stream as "WIDTHxHEIGHT".
    pub fn resolution(&self) -> Option<String> {
        let video = self.video_streams().next()?;
        Some(format!("{}x{}", video.width?, video.height?))
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Probe an input file for streams and duration.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaProbe> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let raw: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    Ok(parse_probe(raw))
}

fn parse_probe(raw: FfprobeOutput) -> MediaProbe {
    let duration_sec = raw
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    let streams = raw
        .streams
        .into_iter()
        .map(|s| {
            let kind = match s.codec_type.as_str() {
                "video" => StreamKind::Video,
                "audio" => StreamKind::Audio,
                _ => StreamKind::Other,
            };
            let kind_key = match kind {
                StreamKind::Video => "video",
                StreamKind::Audio => "audio",
                StreamKind::Other => "other",
            };
            let counter = counts.entry(kind_key).or_insert(0);
            let type_index = *counter;
            *counter += 1;
            StreamInfo {
                kind,
                type_index,
                codec: s.codec_name.unwrap_or_default(),
                width: s.width,
                height: s.height,
                language: s.tags.get("language").cloned(),
                title: s.tags.get("title").cloned(),
            }
        })
        .collect();

    MediaProbe {
        duration_sec,
        streams,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> FfprobeOutput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_streams_and_duration() {
        let probe = parse_probe(raw(
            r#"{
                "format": {"duration": "12.500"},
                "streams": [
                    {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080},
                    {"codec_type": "audio", "codec_name": "aac", "tags": {"language": "eng"}},
                    {"codec_type": "audio", "codec_name": "aac", "tags": {"title": "Commentary"}}
                ]
            }"#,
        ));

        assert!((probe.duration_sec - 12.5).abs() < f64::EPSILON);
        assert_eq!(probe.resolution().as_deref(), Some("1920x1080"));

        let audios: Vec<_> = probe.audio_streams().collect();
        assert_eq!(audios.len(), 2);
        assert_eq!(audios[0].type_index, 0);
        assert_eq!(audios[1].type_index, 1);
        assert_eq!(audios[0].display_name("Audio 1"), "eng");
        assert_eq!(audios[1].display_name("Audio 2"), "Commentary");
    }

    #[test]
    fn missing_duration_defaults_to_zero() {
        let probe = parse_probe(raw(r#"{"format": {}, "streams": []}"#));
        assert_eq!(probe.duration_sec, 0.0);
        assert!(probe.resolution().is_none());
    }
}
