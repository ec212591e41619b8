//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MetadataError {
    /// Map a failed insert, turning a unique-constraint violation into
    /// [`MetadataError::AlreadyExists`].
    ///
    /// Postgres reports SQLSTATE 23505; SQLite reports "UNIQUE constraint failed".
    pub(crate) fn from_insert(err: sqlx::Error, what: impl FnOnce() -> String) -> Self {
        match err {
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some("23505")
                    || db_err.message().contains("UNIQUE constraint") =>
            {
                MetadataError::AlreadyExists(what())
            }
            other => MetadataError::Database(other),
        }
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
