//! Error types for frame processing.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for vision operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors that can occur while loading the model or processing a frame.
#[derive(Debug, Error)]
pub enum VisionError {
    /// Bad or missing image payload.
    #[error("{0}")]
    Decode(String),

    /// The detection model failed on this frame.
    #[error("Model inference failed: {0}")]
    Model(String),

    /// Anything else that went wrong while handling a frame.
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    #[error("Model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VisionError {
    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create a model error.
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }

    /// Create an unexpected error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            VisionError::Decode(_) => "decode",
            VisionError::Model(_) => "model",
            VisionError::Unexpected(_) | VisionError::Io(_) => "unexpected",
            VisionError::ModelNotFound(_) => "model_not_found",
            VisionError::InvalidConfig(_) => "invalid_config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message_is_client_facing() {
        let err = VisionError::decode("No image data received");
        assert_eq!(err.to_string(), "No image data received");
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(VisionError::model("boom").kind(), "model");
        assert_eq!(VisionError::unexpected("boom").kind(), "unexpected");
        assert_eq!(
            VisionError::ModelNotFound(PathBuf::from("/nope.onnx")).to_string(),
            "Model not found: /nope.onnx"
        );
    }
}
