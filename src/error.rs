//! Error types for the wastenet crate.

use thiserror::Error;

/// Main error type for wastenet operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or processing error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Dataset error
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Model construction or architecture error
    #[error("Model error: {0}")]
    Model(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Training error
    #[error("Training error: {0}")]
    Training(String),

    /// Pretrained weight retrieval error
    #[error("Weights error: {0}")]
    Weights(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Specialized Result type for wastenet operations.
pub type Result<T> = std::result::Result<T, Error>;
