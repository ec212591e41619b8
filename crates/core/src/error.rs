//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    MissingField(String),

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("invalid book ID: {0}")]
    InvalidBookId(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
