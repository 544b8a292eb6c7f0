//! Error types for media operations.

use std::path::PathBuf;

use thiserror::Error;

use hlspack_models::FailureReason;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while probing or packaging media.
///
/// `Validation` carries a domain-level rejection of the payload itself
/// (wrong codec, malformed subtitle). Everything else is an infrastructure
/// failure and a candidate for retry.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Payload rejected: {0:?}")]
    Validation(FailureReason),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// The domain rejection carried by this error, if it is one.
    pub fn validation_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Validation(reason) => Some(*reason),
            _ => None,
        }
    }
}
