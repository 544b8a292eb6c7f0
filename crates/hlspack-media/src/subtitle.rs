//! Subtitle payload unpacking and validation.
//!
//! Subtitles arrive as gzip-compressed WebVTT. Unpacking decompresses the
//! payload, checks the WebVTT signature, and writes the plain `.vtt` file.

use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;

use hlspack_models::FailureReason;

use crate::error::{MediaError, MediaResult};

/// Decompressed subtitle payloads above this size are rejected outright.
const MAX_SUBTITLE_BYTES: u64 = 16 * 1024 * 1024;

/// Decompress a gzipped WebVTT payload and write the plain `.vtt` file.
///
/// Returns the decompressed size in bytes. A payload that is not valid gzip
/// or does not carry the WebVTT signature is a domain rejection, not an
/// infrastructure failure.
pub async fn unpack_webvtt(gz_path: &Path, vtt_path: &Path) -> MediaResult<u64> {
    let compressed = tokio::fs::read(gz_path).await?;

    let decompressed = tokio::task::spawn_blocking(move || -> MediaResult<Vec<u8>> {
        let mut decoder = GzDecoder::new(compressed.as_slice()).take(MAX_SUBTITLE_BYTES + 1);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|_| MediaError::Validation(FailureReason::SubtitleFormatInvalid))?;
        Ok(out)
    })
    .await
    .map_err(|e| MediaError::Io(std::io::Error::other(e)))??;

    if decompressed.len() as u64 > MAX_SUBTITLE_BYTES {
        return Err(MediaError::Validation(FailureReason::SubtitleFormatInvalid));
    }
    validate_webvtt(&decompressed)?;

    tokio::fs::write(vtt_path, &decompressed).await?;
    Ok(decompressed.len() as u64)
}

/// Check the WebVTT signature: an optional BOM followed by "WEBVTT".
fn validate_webvtt(bytes: &[u8]) -> MediaResult<()> {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if body.starts_with(b"WEBVTT") {
        Ok(())
    } else {
        Err(MediaError::Validation(FailureReason::SubtitleFormatInvalid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn unpacks_valid_webvtt() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("in.vtt.gz");
        let vtt = dir.path().join("out.vtt");
        let payload = b"WEBVTT\n\n00:00.000 --> 00:01.000\nhi\n";
        tokio::fs::write(&gz, gzip(payload)).await.unwrap();

        let size = unpack_webvtt(&gz, &vtt).await.unwrap();

        assert_eq!(size, payload.len() as u64);
        assert_eq!(tokio::fs::read(&vtt).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn accepts_bom_prefixed_webvtt() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("in.vtt.gz");
        let vtt = dir.path().join("out.vtt");
        tokio::fs::write(&gz, gzip(b"\xEF\xBB\xBFWEBVTT\n")).await.unwrap();

        assert!(unpack_webvtt(&gz, &vtt).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_non_webvtt_payload() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("in.srt.gz");
        let vtt = dir.path().join("out.vtt");
        tokio::fs::write(&gz, gzip(b"1\n00:00:00,000 --> 00:00:01,000\nhi\n"))
            .await
            .unwrap();

        let err = unpack_webvtt(&gz, &vtt).await.unwrap_err();
        assert_eq!(
            err.validation_reason(),
            Some(FailureReason::SubtitleFormatInvalid)
        );
        assert!(!vtt.exists());
    }

    #[tokio::test]
    async fn rejects_garbage_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("in.gz");
        let vtt = dir.path().join("out.vtt");
        tokio::fs::write(&gz, b"not gzip at all").await.unwrap();

        let err = unpack_webvtt(&gz, &vtt).await.unwrap_err();
        assert!(err.validation_reason().is_some());
    }
}
