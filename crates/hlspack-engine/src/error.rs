//! Engine error types.

use thiserror::Error;

use hlspack_datastore::StoreError;
use hlspack_media::MediaError;
use hlspack_models::FailureReason;
use hlspack_storage::StorageError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by task handlers and the execution engine.
///
/// The taxonomy drives the retry decision: `NotFound`, `Conflict` and
/// `Validation` are terminal for the attempt; everything else leaves the task
/// row in place for the next lease cycle.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload rejected: {0:?}")]
    Validation(Vec<FailureReason>),

    #[error("Waiting on external progress: {0}")]
    Reschedule(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Media error: {0}")]
    Media(MediaError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn reschedule(msg: impl Into<String>) -> Self {
        Self::Reschedule(msg.into())
    }

    pub fn publish_failed(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the next lease cycle may plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::Conflict(_) | Self::Validation(_) | Self::ConfigError(_) => {
                false
            }
            Self::Reschedule(_) | Self::PublishFailed(_) | Self::Http(_) | Self::Io(_) => true,
            // Fail-open to retry for store errors, except fencing failures
            // that should have been mapped to Conflict.
            Self::Store(e) => !e.is_precondition_failed(),
            Self::Storage(e) => e.is_transient(),
            Self::Media(e) => e.validation_reason().is_none(),
        }
    }

    /// Whether this is a fencing failure (terminal for the attempt).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Domain rejection reasons, if this is a validation failure.
    pub fn validation_reasons(&self) -> Option<&[FailureReason]> {
        match self {
            Self::Validation(reasons) => Some(reasons),
            _ => None,
        }
    }
}

impl From<MediaError> for EngineError {
    fn from(e: MediaError) -> Self {
        match e.validation_reason() {
            Some(reason) => Self::Validation(vec![reason]),
            None => Self::Media(e),
        }
    }
}

/// Map a failed write precondition to `Conflict`; pass other store errors
/// through. Finalize steps use this so a superseded container surfaces as a
/// fencing failure rather than an infrastructure one.
pub fn conflict_on_precondition(e: StoreError, context: &str) -> EngineError {
    if e.is_precondition_failed() {
        EngineError::conflict(format!("{context}: {e}"))
    } else {
        EngineError::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_and_validation_are_terminal() {
        assert!(!EngineError::conflict("fence moved").is_retryable());
        assert!(!EngineError::not_found("gone").is_retryable());
        assert!(!EngineError::Validation(vec![FailureReason::UploadTooLarge]).is_retryable());
    }

    #[test]
    fn media_validation_maps_to_validation() {
        let err: EngineError =
            MediaError::Validation(FailureReason::SubtitleFormatInvalid).into();
        assert_eq!(
            err.validation_reasons(),
            Some(&[FailureReason::SubtitleFormatInvalid][..])
        );
    }

    #[test]
    fn precondition_maps_to_conflict() {
        let err = conflict_on_precondition(StoreError::PreconditionFailed("v1".into()), "finalize");
        assert!(err.is_conflict());
    }
}
