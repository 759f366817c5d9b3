//! Error Handling Module
//!
//! Defines the error taxonomy for the leaf classifier.
//! Uses thiserror for ergonomic error definitions.
//!
//! Startup problems (`Model`, `Config`, `Device`) are fatal and propagate out of
//! `main`. `Decode` is the only per-request error a caller is expected to
//! recover from, by reporting it back to whoever uploaded the bytes.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for leaf classifier operations
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// Input bytes could not be decoded as an image
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Weight bundle missing, unreadable, or shape-incompatible
    #[error("Model error: {0}")]
    Model(String),

    /// Manifest or runtime configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Forward pass or tensor extraction failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Device/hardware error
    #[error("Device error: {0}")]
    Device(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl ClassifierError {
    /// Whether this error was caused by undecodable input bytes
    pub fn is_decode(&self) -> bool {
        matches!(self, ClassifierError::Decode(_))
    }
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for ClassifierError {
    fn from(err: image::ImageError) -> Self {
        ClassifierError::Decode(err.to_string())
    }
}

impl From<burn::record::RecorderError> for ClassifierError {
    fn from(err: burn::record::RecorderError) -> Self {
        ClassifierError::Model(format!("{:?}", err))
    }
}

/// Convenience Result type for leaf classifier operations
pub type Result<T> = std::result::Result<T, ClassifierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClassifierError::Model("shape mismatch".to_string());
        assert_eq!(format!("{}", err), "Model error: shape mismatch");
    }

    #[test]
    fn test_decode_error_is_distinct() {
        let err: ClassifierError =
            image::load_from_memory(b"definitely not an image").unwrap_err().into();
        assert!(err.is_decode());
        assert!(!ClassifierError::Config("x".to_string()).is_decode());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ClassifierError = io_err.into();
        assert!(matches!(err, ClassifierError::Io(_)));
    }
}
