//! Error types for EndoGuide.

use thiserror::Error;

/// Main error type for EndoGuide operations.
#[derive(Error, Debug)]
pub enum EndoGuideError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Preprocessing error: {0}")]
    Preprocess(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Analysis error in {stage}: {message}")]
    Analysis {
        stage: &'static str,
        message: String,
    },

    #[error("Device probe error: {0}")]
    DeviceProbe(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used to decide how far an error may propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A single frame failed; the stream keeps running.
    TransientFrame,
    /// Invalid configuration; fails construction before `start()`.
    Configuration,
    /// Hardware could not be classified; the generic CPU path is used.
    DeviceProbe,
    /// Anything else (thread spawn, I/O).
    Runtime,
}

impl EndoGuideError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for an analysis-stage error.
    pub fn analysis(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Analysis {
            stage,
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Preprocess(_) | Self::Inference(_) | Self::Analysis { .. } => {
                ErrorClass::TransientFrame
            }
            Self::Configuration(_) | Self::Serialization(_) => ErrorClass::Configuration,
            Self::DeviceProbe(_) => ErrorClass::DeviceProbe,
            Self::Worker(_) | Self::Io(_) => ErrorClass::Runtime,
        }
    }

    /// True when the error only affects the frame being processed.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::TransientFrame
    }
}

/// Result type alias for EndoGuide operations.
pub type Result<T> = std::result::Result<T, EndoGuideError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_errors_are_transient() {
        assert!(EndoGuideError::Inference("timeout".into()).is_transient());
        assert!(EndoGuideError::analysis("depth", "empty region").is_transient());
        assert!(!EndoGuideError::config("queue_capacity must be > 0").is_transient());
    }

    #[test]
    fn test_probe_error_class() {
        let err = EndoGuideError::DeviceProbe("unknown accelerator".into());
        assert_eq!(err.class(), ErrorClass::DeviceProbe);
        assert_eq!(err.to_string(), "Device probe error: unknown accelerator");
    }
}
