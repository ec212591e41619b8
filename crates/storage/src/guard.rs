//! Scope guard for streaming uploads.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobRef, StreamingUpload, UploadStream};
use bytes::Bytes;
use futures::StreamExt;

/// Guard that aborts a streaming upload on drop unless explicitly completed.
///
/// Covers every exit that does not reach [`UploadGuard::finish`]: early
/// returns, errors, timeouts and cancellation of the owning future. On drop
/// the abort is spawned on the runtime captured at construction.
pub struct UploadGuard {
    blob_ref: BlobRef,
    upload: Option<Box<dyn StreamingUpload>>,
    bytes_written: u64,
    runtime_handle: Option<tokio::runtime::Handle>,
}

impl UploadGuard {
    /// Wrap an upload started for `blob_ref`.
    ///
    /// Uses `Handle::try_current()` so construction outside a runtime does not
    /// panic; such a guard cannot clean up on drop.
    pub fn new(blob_ref: BlobRef, upload: Box<dyn StreamingUpload>) -> Self {
        Self {
            blob_ref,
            upload: Some(upload),
            bytes_written: 0,
            runtime_handle: tokio::runtime::Handle::try_current().ok(),
        }
    }

    pub fn blob_ref(&self) -> &BlobRef {
        &self.blob_ref
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn upload_mut(&mut self) -> StorageResult<&mut Box<dyn StreamingUpload>> {
        self.upload
            .as_mut()
            .ok_or_else(|| StorageError::Io(std::io::Error::other("upload already completed")))
    }

    /// Write a chunk of data.
    pub async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        let len = data.len() as u64;
        self.upload_mut()?.write(data).await?;
        self.bytes_written += len;
        Ok(())
    }

    /// Drain `content` into the upload, returning the running byte count.
    ///
    /// Stops at the first error from either side. The upload stays open so the
    /// caller decides between `abort` and dropping the guard.
    pub async fn write_all(&mut self, mut content: UploadStream<'_>) -> StorageResult<u64> {
        while let Some(chunk) = content.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            self.write(chunk).await?;
        }
        Ok(self.bytes_written)
    }

    /// Publish the upload. Drop will not abort after this.
    pub async fn finish(mut self) -> StorageResult<u64> {
        let upload = self
            .upload
            .take()
            .ok_or_else(|| StorageError::Io(std::io::Error::other("upload already completed")))?;
        upload.finish().await
    }

    /// Explicitly abort the upload.
    pub async fn abort(mut self) -> StorageResult<()> {
        match self.upload.take() {
            Some(upload) => upload.abort().await,
            None => Ok(()),
        }
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if let Some(upload) = self.upload.take() {
            let blob_ref = self.blob_ref.clone();
            if let Some(ref handle) = self.runtime_handle {
                handle.spawn(async move {
                    if let Err(e) = upload.abort().await {
                        tracing::error!(blob_ref = %blob_ref, error = %e, "Failed to abort orphaned upload");
                    } else {
                        tracing::info!(blob_ref = %blob_ref, "Aborted orphaned upload");
                    }
                });
            } else {
                tracing::warn!(
                    blob_ref = %blob_ref,
                    "UploadGuard dropped without runtime handle - staged data may be orphaned"
                );
            }
        }
    }
}
