//! Static dispatch over the media/subtitle halves of the processing state.
//!
//! Uploading and parts of formatting are identical for the two payload
//! kinds except for which `ProcessingState` variants they read and write;
//! this trait closes that difference over a fixed set of implementations.

use hlspack_models::{
    FormattingState, ProcessingState, TaskKind, UploadingState, VideoContainer,
};

/// One payload kind (media or subtitle) of the uploading/formatting stages.
pub trait StageKind: Send + Sync + 'static {
    const UPLOADING_KIND: TaskKind;
    const FORMATTING_KIND: TaskKind;

    /// This kind's uploading state, if it is the active stage.
    fn uploading_state(container: &VideoContainer) -> Option<&UploadingState>;

    /// This kind's formatting state, if it is the active stage.
    fn formatting_state(container: &VideoContainer) -> Option<&FormattingState>;

    /// Advance the container's processing marker to this kind's formatting
    /// stage.
    fn set_formatting(container: &mut VideoContainer, gcs_filename: String);
}

/// Video/audio media payloads.
pub struct MediaStage;

impl StageKind for MediaStage {
    const UPLOADING_KIND: TaskKind = TaskKind::MediaUploading;
    const FORMATTING_KIND: TaskKind = TaskKind::MediaFormatting;

    fn uploading_state(container: &VideoContainer) -> Option<&UploadingState> {
        match &container.processing {
            Some(ProcessingState::MediaUploading(state)) => Some(state),
            _ => None,
        }
    }

    fn formatting_state(container: &VideoContainer) -> Option<&FormattingState> {
        match &container.processing {
            Some(ProcessingState::MediaFormatting(state)) => Some(state),
            _ => None,
        }
    }

    fn set_formatting(container: &mut VideoContainer, gcs_filename: String) {
        container.processing = Some(ProcessingState::MediaFormatting(FormattingState {
            gcs_filename,
        }));
    }
}

/// Subtitle payloads.
pub struct SubtitleStage;

impl StageKind for SubtitleStage {
    const UPLOADING_KIND: TaskKind = TaskKind::SubtitleUploading;
    const FORMATTING_KIND: TaskKind = TaskKind::SubtitleFormatting;

    fn uploading_state(container: &VideoContainer) -> Option<&UploadingState> {
        match &container.processing {
            Some(ProcessingState::SubtitleUploading(state)) => Some(state),
            _ => None,
        }
    }

    fn formatting_state(container: &VideoContainer) -> Option<&FormattingState> {
        match &container.processing {
            Some(ProcessingState::SubtitleFormatting(state)) => Some(state),
            _ => None,
        }
    }

    fn set_formatting(container: &mut VideoContainer, gcs_filename: String) {
        container.processing = Some(ProcessingState::SubtitleFormatting(FormattingState {
            gcs_filename,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hlspack_models::ContainerId;

    #[test]
    fn kinds_only_see_their_own_variants() {
        let mut container = VideoContainer::new(ContainerId::from_string("c1"));
        container.processing = Some(ProcessingState::MediaUploading(UploadingState {
            gcs_filename: "v.mp4".to_string(),
            upload_session_url: "http://session".to_string(),
            content_length: 10,
            created_time: Utc::now(),
        }));

        assert!(MediaStage::uploading_state(&container).is_some());
        assert!(SubtitleStage::uploading_state(&container).is_none());

        SubtitleStage::set_formatting(&mut container, "s.vtt.gz".to_string());
        assert!(SubtitleStage::formatting_state(&container).is_some());
        assert!(MediaStage::formatting_state(&container).is_none());
    }
}
