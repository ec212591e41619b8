//! Blob storage abstraction and backends for the bookshelf service.
//!
//! This crate provides:
//! - The [`BlobStore`] trait with globally unique, never-overwritten keys
//! - [`UploadGuard`], which aborts unfinished streaming writes
//! - [`limit_size`], a per-file size cap for upload streams
//! - A local filesystem backend

pub mod backends;
pub mod error;
pub mod guard;
pub mod limit;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use guard::UploadGuard;
pub use limit::limit_size;
pub use traits::{
    BlobMetadata, BlobRef, BlobStore, ByteStream, ObjectMeta, StoredBlob, StreamingUpload,
    UploadStream,
};

use shelf_core::config::StorageConfig;
use std::sync::Arc;

/// Create a blob store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            tracing::info!(path = %path.display(), "Filesystem blob store ready");
            Ok(Arc::new(backend))
        }
    }
}
