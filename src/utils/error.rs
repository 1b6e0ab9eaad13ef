//! Error Handling Module
//!
//! Defines the error type shared by the library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for AlexNet operations
#[derive(Error, Debug)]
pub enum AlexNetError {
    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Dataset layout or content error
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// The first training example does not look like the model expects
    #[error("Input assumption violated: {0}")]
    InputAssumption(String),

    /// Fetching or decoding the label-name mapping failed
    #[error("Label mapping error: {0}")]
    Labels(String),

    /// Error with model operations (record save/load)
    #[error("Model error: {0}")]
    Model(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

/// Convenience Result type for AlexNet operations
pub type Result<T> = std::result::Result<T, AlexNetError>;

impl From<image::ImageError> for AlexNetError {
    fn from(err: image::ImageError) -> Self {
        AlexNetError::ImageLoad(PathBuf::new(), err.to_string())
    }
}

impl From<serde_json::Error> for AlexNetError {
    fn from(err: serde_json::Error) -> Self {
        AlexNetError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AlexNetError::Dataset("test error".to_string());
        assert_eq!(format!("{}", err), "Dataset error: test error");
    }

    #[test]
    fn test_image_load_error() {
        let path = PathBuf::from("/path/to/image.JPEG");
        let err = AlexNetError::ImageLoad(path, "file not found".to_string());
        assert!(format!("{}", err).contains("image.JPEG"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AlexNetError = io.into();
        assert!(matches!(err, AlexNetError::Io(_)));
    }

    #[test]
    fn test_input_assumption_message() {
        let err = AlexNetError::InputAssumption("expected 3 channels, got 1".into());
        assert_eq!(
            err.to_string(),
            "Input assumption violated: expected 3 channels, got 1"
        );
    }
}
