//! Storage trait definitions.

use crate::error::StorageResult;
use crate::guard::UploadGuard;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// A boxed stream of upload content.
///
/// Unlike [`ByteStream`] this may borrow from its source, such as a multipart
/// field that lives only as long as the request.
pub type UploadStream<'a> = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send + 'a>>;

/// Opaque key of a stored blob, chosen by the backend at write time.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobRef({})", self.0)
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BlobRef {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Descriptive metadata kept alongside a blob.
///
/// Informational only; the metadata store stays authoritative for anything
/// searchable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub content_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl BlobMetadata {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
    /// Content type (if available).
    pub content_type: Option<String>,
}

/// Result of a completed write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBlob {
    pub blob_ref: BlobRef,
    pub size: u64,
}

/// Blob store abstraction.
///
/// Every write lands under a fresh key, so a committed blob is never
/// overwritten by a later upload of the same name.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Start a streaming upload for `name`.
    ///
    /// The returned [`BlobRef`] is where the blob will be visible once the
    /// upload finishes. Nothing is visible under it before that.
    async fn put_stream(
        &self,
        name: &str,
        metadata: &BlobMetadata,
    ) -> StorageResult<(BlobRef, Box<dyn StreamingUpload>)>;

    /// Stream `content` into a new blob.
    ///
    /// Any error from `content` aborts the write and removes partial data.
    async fn put(
        &self,
        name: &str,
        content: UploadStream<'_>,
        metadata: &BlobMetadata,
    ) -> StorageResult<StoredBlob> {
        let (blob_ref, upload) = self.put_stream(name, metadata).await?;
        let mut guard = UploadGuard::new(blob_ref.clone(), upload);

        if let Err(e) = guard.write_all(content).await {
            if let Err(abort_err) = guard.abort().await {
                tracing::warn!(blob_ref = %blob_ref, error = %abort_err, "Failed to abort upload");
            }
            return Err(e);
        }

        let size = guard.finish().await?;
        Ok(StoredBlob { blob_ref, size })
    }

    /// Get a blob as a byte stream.
    async fn get(&self, blob_ref: &BlobRef) -> StorageResult<ByteStream>;

    /// Get a blob's size and content type without fetching content.
    async fn head(&self, blob_ref: &BlobRef) -> StorageResult<ObjectMeta>;

    /// Check if a blob exists.
    async fn exists(&self, blob_ref: &BlobRef) -> StorageResult<bool>;

    /// Delete a blob. Deleting a blob that is already gone succeeds.
    async fn delete(&self, blob_ref: &BlobRef) -> StorageResult<()>;

    /// Get the name of this storage backend, for logging and metrics.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend availability.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Trait for streaming uploads.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Publish the upload and return the total bytes written.
    ///
    /// On error the implementation removes whatever it staged.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
