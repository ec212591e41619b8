//! Blob store test utilities.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use shelf_storage::{
    BlobMetadata, BlobRef, BlobStore, ByteStream, FilesystemBackend, ObjectMeta, StorageError,
    StorageResult, StreamingUpload,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Filesystem backend wrapper with switchable faults.
pub struct FaultyStorage {
    inner: FilesystemBackend,
    root: PathBuf,
    fail_delete: AtomicBool,
    fail_put: AtomicBool,
    /// Per-chunk write delay in milliseconds; zero disables it.
    write_delay_ms: Arc<AtomicU64>,
    deletes: AtomicUsize,
}

impl FaultyStorage {
    pub async fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let inner = FilesystemBackend::new(&root)
            .await
            .expect("Failed to create storage backend");
        Self {
            inner,
            root,
            fail_delete: AtomicBool::new(false),
            fail_put: AtomicBool::new(false),
            write_delay_ms: Arc::new(AtomicU64::new(0)),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Delete calls seen, including failed ones.
    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Published blobs on disk, ignoring sidecars and staging files.
    pub fn blob_count(&self) -> usize {
        blob_files(&self.root).len()
    }

    /// Staging files left on disk.
    pub fn staged_count(&self) -> usize {
        std::fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Wait until the blob count settles at `expected` or two seconds pass.
    pub async fn wait_for_blob_count(&self, expected: usize) -> usize {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let count = self.blob_count();
            if count == expected || tokio::time::Instant::now() >= deadline {
                return count;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Names of published blobs under `root`.
pub fn blob_files(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| !name.ends_with(".meta.json") && !name.contains(".tmp."))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

struct SlowUpload {
    inner: Box<dyn StreamingUpload>,
    delay_ms: Arc<AtomicU64>,
}

#[async_trait]
impl StreamingUpload for SlowUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.write(data).await
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        self.inner.finish().await
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.inner.abort().await
    }
}

#[async_trait]
impl BlobStore for FaultyStorage {
    async fn put_stream(
        &self,
        name: &str,
        metadata: &BlobMetadata,
    ) -> StorageResult<(BlobRef, Box<dyn StreamingUpload>)> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("injected put failure")));
        }
        let (blob_ref, upload) = self.inner.put_stream(name, metadata).await?;
        let upload = SlowUpload {
            inner: upload,
            delay_ms: self.write_delay_ms.clone(),
        };
        Ok((blob_ref, Box::new(upload)))
    }

    async fn get(&self, blob_ref: &BlobRef) -> StorageResult<ByteStream> {
        self.inner.get(blob_ref).await
    }

    async fn head(&self, blob_ref: &BlobRef) -> StorageResult<ObjectMeta> {
        self.inner.head(blob_ref).await
    }

    async fn exists(&self, blob_ref: &BlobRef) -> StorageResult<bool> {
        self.inner.exists(blob_ref).await
    }

    async fn delete(&self, blob_ref: &BlobRef) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("injected delete failure")));
        }
        self.inner.delete(blob_ref).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty-filesystem"
    }
}
