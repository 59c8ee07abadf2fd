use thiserror::Error;

/// Shown when the service answers with neither an image part nor any text.
pub const NO_IMAGE_MESSAGE: &str =
    "The model did not return an image. The response may have been blocked or contained no usable content.";

/// Shown when a prompt rewrite comes back empty.
pub const NO_REWRITE_MESSAGE: &str = "Failed to get an enhanced prompt from the model.";

/// Shown when a merge is submitted without a reference image attached.
pub const MERGE_NEEDS_REFERENCE_MESSAGE: &str =
    "Attach a design or background image to merge into before submitting.";

/// Failure taxonomy for an editing operation. Every variant carries the
/// message shown to the user, shaped at the construction site.
///
/// `Decode` never escapes the normalizer: an image without a usable raster
/// surface is sent on in its original form instead of failing the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// The submission was malformed; no service traffic happened.
    #[error("{0}")]
    Validation(String),
    /// The service replied with prose instead of an image.
    #[error("{0}")]
    ServiceRefusal(String),
    /// The service replied with neither an image nor any text.
    #[error("{0}")]
    ServiceSilence(String),
    /// Network, HTTP status, or payload-shape failure talking to the service.
    #[error("{0}")]
    Transport(String),
    /// No raster surface could be obtained from the input bytes.
    #[error("{0}")]
    Decode(String),
}

impl EditError {
    pub fn silence() -> Self {
        Self::ServiceSilence(NO_IMAGE_MESSAGE.to_string())
    }

    pub fn empty_rewrite() -> Self {
        Self::ServiceSilence(NO_REWRITE_MESSAGE.to_string())
    }

    /// Stable kind name used in event payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::ServiceRefusal(_) => "service_refusal",
            Self::ServiceSilence(_) => "service_silence",
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation(message)
            | Self::ServiceRefusal(message)
            | Self::ServiceSilence(message)
            | Self::Transport(message)
            | Self::Decode(message) => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_user_facing_message() {
        let err = EditError::ServiceRefusal("I cannot edit this image.".to_string());
        assert_eq!(err.to_string(), "I cannot edit this image.");
        assert_eq!(err.message(), "I cannot edit this image.");
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(EditError::Validation(String::new()).kind(), "validation");
        assert_eq!(EditError::silence().kind(), "service_silence");
        assert_eq!(EditError::Transport(String::new()).kind(), "transport");
        assert_eq!(EditError::Decode(String::new()).kind(), "decode");
    }

    #[test]
    fn silence_carries_the_generic_message() {
        assert_eq!(EditError::silence().message(), NO_IMAGE_MESSAGE);
        assert_eq!(EditError::empty_rewrite().message(), NO_REWRITE_MESSAGE);
    }
}
