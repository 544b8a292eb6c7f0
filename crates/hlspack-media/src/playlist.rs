//! Master and subtitle playlist rendering.
//!
//! Pure string assembly; callers decide filenames and where the bytes go.

use std::fmt::Write;

/// The video rendition of a master playlist.
#[derive(Debug, Clone)]
pub struct VideoRendition {
    /// Track directory name relative to the master playlist
    pub dirname: String,
    /// "WIDTHxHEIGHT"
    pub resolution: String,
    /// Average bandwidth in bits per second
    pub bandwidth: u64,
}

/// An alternate audio or subtitle rendition.
#[derive(Debug, Clone)]
pub struct AltRendition {
    /// Track directory name relative to the master playlist
    pub dirname: String,
    /// Display name
    pub name: String,
    /// Whether this rendition is the default selection
    pub is_default: bool,
}

/// Render a master playlist referencing one video rendition plus alternate
/// audio and subtitle renditions.
pub fn master_playlist(
    video: &VideoRendition,
    audios: &[AltRendition],
    subtitles: &[AltRendition],
) -> String {
    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:6\n");

    for audio in audios {
        writeln!(
            out,
            "#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"audio\",NAME=\"{}\",DEFAULT={},AUTOSELECT=YES,URI=\"{}/playlist.m3u8\"",
            escape_attr(&audio.name),
            yes_no(audio.is_default),
            audio.dirname,
        )
        .expect("write to String");
    }

    for sub in subtitles {
        writeln!(
            out,
            "#EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"subs\",NAME=\"{}\",DEFAULT={},AUTOSELECT=YES,URI=\"{}/playlist.m3u8\"",
            escape_attr(&sub.name),
            yes_no(sub.is_default),
            sub.dirname,
        )
        .expect("write to String");
    }

    let mut stream_inf = format!(
        "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}",
        video.bandwidth.max(1),
        video.resolution
    );
    if !audios.is_empty() {
        stream_inf.push_str(",AUDIO=\"audio\"");
    }
    if !subtitles.is_empty() {
        stream_inf.push_str(",SUBTITLES=\"subs\"");
    }
    writeln!(out, "{stream_inf}").expect("write to String");
    writeln!(out, "{}/playlist.m3u8", video.dirname).expect("write to String");

    out
}

/// Render the single-segment media playlist for a subtitle track.
pub fn subtitle_media_playlist(duration_sec: f64, vtt_filename: &str) -> String {
    let target = duration_sec.ceil().max(1.0) as u64;
    format!(
        "#EXTM3U\n\
         #EXT-X-VERSION:6\n\
         #EXT-X-TARGETDURATION:{target}\n\
         #EXT-X-PLAYLIST-TYPE:VOD\n\
         #EXTINF:{duration_sec:.3},\n\
         {vtt_filename}\n\
         #EXT-X-ENDLIST\n"
    )
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "YES"
    } else {
        "NO"
    }
}

/// Strip characters that would break an M3U8 quoted attribute value.
fn escape_attr(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '"' && *c != '\n' && *c != '\r' && *c != ',')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video() -> VideoRendition {
        VideoRendition {
            dirname: "vid-abc".to_string(),
            resolution: "1920x1080".to_string(),
            bandwidth: 4_500_000,
        }
    }

    #[test]
    fn master_with_audio_and_subtitles() {
        let audios = vec![AltRendition {
            dirname: "aud-en".to_string(),
            name: "English".to_string(),
            is_default: true,
        }];
        let subs = vec![AltRendition {
            dirname: "sub-en".to_string(),
            name: "English".to_string(),
            is_default: false,
        }];

        let m3u8 = master_playlist(&video(), &audios, &subs);

        assert!(m3u8.starts_with("#EXTM3U\n"));
        assert!(m3u8.contains(
            "#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"audio\",NAME=\"English\",DEFAULT=YES,AUTOSELECT=YES,URI=\"aud-en/playlist.m3u8\""
        ));
        assert!(m3u8.contains("TYPE=SUBTITLES"));
        assert!(m3u8.contains(
            "#EXT-X-STREAM-INF:BANDWIDTH=4500000,RESOLUTION=1920x1080,AUDIO=\"audio\",SUBTITLES=\"subs\""
        ));
        assert!(m3u8.ends_with("vid-abc/playlist.m3u8\n"));
    }

    #[test]
    fn master_video_only_omits_groups() {
        let m3u8 = master_playlist(&video(), &[], &[]);
        assert!(!m3u8.contains("AUDIO="));
        assert!(!m3u8.contains("SUBTITLES="));
    }

    #[test]
    fn quoted_attr_is_sanitized() {
        let audios = vec![AltRendition {
            dirname: "aud-x".to_string(),
            name: "Bad\"Name,With\nJunk".to_string(),
            is_default: false,
        }];
        let m3u8 = master_playlist(&video(), &audios, &[]);
        assert!(m3u8.contains("NAME=\"BadNameWithJunk\""));
    }

    #[test]
    fn subtitle_playlist_is_single_segment_vod() {
        let m3u8 = subtitle_media_playlist(83.2, "subtitles.vtt");
        assert!(m3u8.contains("#EXT-X-TARGETDURATION:84"));
        assert!(m3u8.contains("#EXTINF:83.200,\nsubtitles.vtt"));
        assert!(m3u8.ends_with("#EXT-X-ENDLIST\n"));
    }
}
