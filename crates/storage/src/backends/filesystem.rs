//! Local filesystem storage backend.
//!
//! Layout under the root directory:
//! - `{millis}-{suffix}-{name}`: blob content
//! - `{key}.meta.json`: blob metadata sidecar
//! - `{key}.tmp.{uuid}`: staged content of an upload in progress

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobMetadata, BlobRef, BlobStore, ByteStream, ObjectMeta, StreamingUpload};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Suffix of the JSON file holding a blob's [`BlobMetadata`].
pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// Local filesystem blob store.
pub struct FilesystemBackend {
    root: PathBuf,
}

/// Longest accepted blob name. The key prefix and the staging suffix must
/// still fit in a 255-byte file name.
const MAX_NAME_BYTES: usize = 160;

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build a fresh key for `name`: upload time in milliseconds, a random
    /// suffix, then the name itself.
    fn generate_key(name: &str) -> StorageResult<String> {
        if name.len() > MAX_NAME_BYTES {
            return Err(StorageError::InvalidKey(format!(
                "blob name is {} bytes, limit is {MAX_NAME_BYTES}",
                name.len()
            )));
        }
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(StorageError::InvalidKey(format!(
                "blob name must be a single path component: {name:?}"
            )));
        }

        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let suffix = Uuid::new_v4().simple().to_string();
        Ok(format!("{millis}-{}-{name}", &suffix[..8]))
    }

    /// Get the full path for a key, with path traversal protection.
    ///
    /// Runs the checks on the blocking pool since `canonicalize` and
    /// `symlink_metadata` are synchronous.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Synchronous key path validation.
    ///
    /// Returns an error if the key would escape the storage root, including
    /// through a symlink at the key itself or at any existing ancestor.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        for component in Path::new(key).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "contains unsafe path component: {key}"
                    )));
                }
            }
        }

        let path = root.join(key);

        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        match std::fs::symlink_metadata(&path) {
            Ok(meta) => {
                let canonical = path.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidKey(format!(
                            "symlink target missing or invalid: {key}"
                        ))
                    } else {
                        StorageError::Io(std::io::Error::new(
                            e.kind(),
                            format!("failed to canonicalize path: {e}"),
                        ))
                    }
                })?;

                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "resolved path escapes storage root: {key}"
                    )));
                }
                return Ok(path);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(StorageError::Io(std::io::Error::new(
                    err.kind(),
                    format!("failed to stat path: {err}"),
                )));
            }
        }

        // New path: the nearest existing ancestor must resolve inside the root.
        let mut ancestor = path.as_path();
        while let Some(parent) = ancestor.parent() {
            match std::fs::symlink_metadata(parent) {
                Ok(meta) => {
                    let parent_canonical = parent.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "ancestor symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(std::io::Error::new(
                                e.kind(),
                                format!("failed to canonicalize ancestor: {e}"),
                            ))
                        }
                    })?;

                    if !parent_canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "ancestor path escapes storage root: {key}"
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat ancestor: {err}"),
                    )));
                }
            }
            ancestor = parent;
        }

        Ok(path)
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Read the sidecar of a blob, if present and readable.
    async fn read_sidecar(&self, path: &Path) -> Option<BlobMetadata> {
        let raw = match fs::read(sidecar_path(path)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read blob sidecar");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed blob sidecar");
                None
            }
        }
    }
}

fn sidecar_path(path: &Path) -> PathBuf {
    with_suffix(path, SIDECAR_SUFFIX)
}

fn temp_path(path: &Path) -> PathBuf {
    with_suffix(path, &format!(".tmp.{}", Uuid::new_v4()))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn not_found_or_io(key: &str, e: std::io::Error) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(e)
    }
}

/// Remove a file, treating an already-missing file as removed.
async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl BlobStore for FilesystemBackend {
    #[instrument(skip(self, metadata), fields(backend = "filesystem"))]
    async fn put_stream(
        &self,
        name: &str,
        metadata: &BlobMetadata,
    ) -> StorageResult<(BlobRef, Box<dyn StreamingUpload>)> {
        let key = Self::generate_key(name)?;
        let path = self.key_path(&key).await?;
        self.ensure_parent(&path).await?;

        let sidecar = serde_json::to_vec_pretty(metadata)?;
        let temp_path = temp_path(&path);
        let file = fs::File::create(&temp_path).await?;

        tracing::debug!(key = %key, "Started streaming upload");

        Ok((
            BlobRef::new(key.clone()),
            Box::new(FilesystemUpload {
                key,
                file,
                temp_path,
                final_path: path,
                sidecar,
                bytes_written: 0,
            }),
        ))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, blob_ref: &BlobRef) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.key_path(blob_ref.as_str()).await?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or_io(blob_ref.as_str(), e))?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, blob_ref: &BlobRef) -> StorageResult<ObjectMeta> {
        let path = self.key_path(blob_ref.as_str()).await?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| not_found_or_io(blob_ref.as_str(), e))?;

        let content_type = self.read_sidecar(&path).await.map(|m| m.content_type);

        Ok(ObjectMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(|t| t.into()),
            content_type,
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, blob_ref: &BlobRef) -> StorageResult<bool> {
        let path = self.key_path(blob_ref.as_str()).await?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, blob_ref: &BlobRef) -> StorageResult<()> {
        let path = self.key_path(blob_ref.as_str()).await?;

        if !remove_if_exists(&path).await? {
            tracing::debug!(blob_ref = %blob_ref, "Blob already absent");
        }
        remove_if_exists(&sidecar_path(&path)).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {}", e),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

/// Streaming upload for filesystem backend.
///
/// Content is staged in a temp file next to the final path and published
/// with a hard link, which fails instead of replacing an existing file.
struct FilesystemUpload {
    key: String,
    file: fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    sidecar: Vec<u8>,
    bytes_written: u64,
}

impl FilesystemUpload {
    async fn publish(&mut self) -> StorageResult<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;

        fs::hard_link(&self.temp_path, &self.final_path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    StorageError::AlreadyExists(self.key.clone())
                } else {
                    StorageError::Io(e)
                }
            })?;

        if let Err(e) = write_atomic(&sidecar_path(&self.final_path), &self.sidecar).await {
            // Unpublish so the blob is never visible without its sidecar.
            let _ = fs::remove_file(&self.final_path).await;
            return Err(e);
        }
        Ok(())
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let temp = temp_path(path);
    let result = async {
        let mut file = fs::File::create(&temp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        fs::rename(&temp, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&temp).await;
    }
    result.map_err(StorageError::Io)
}

#[async_trait]
impl StreamingUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        let result = self.publish().await;

        // The temp file is only a second link once published.
        if let Err(e) = fs::remove_file(&self.temp_path).await {
            tracing::warn!(path = %self.temp_path.display(), error = %e, "Failed to remove staged upload");
        }

        result.map(|()| self.bytes_written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        drop(self.file);
        remove_if_exists(&self.temp_path).await?;
        tracing::debug!(key = %self.key, "Aborted streaming upload");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::UploadStream;
    use futures::StreamExt;

    fn content(data: &'static [u8]) -> UploadStream<'static> {
        Box::pin(futures::stream::iter(
            data.chunks(3).map(|c| Ok(Bytes::from_static(c))).collect::<Vec<_>>(),
        ))
    }

    fn pdf_meta() -> BlobMetadata {
        BlobMetadata::new("application/pdf").with_attribute("title", "dune")
    }

    async fn read_all(backend: &FilesystemBackend, blob_ref: &BlobRef) -> Vec<u8> {
        let mut stream = backend.get(blob_ref).await.unwrap();
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let stored = backend
            .put("dune.pdf", content(b"%PDF-1.7 hello"), &pdf_meta())
            .await
            .unwrap();

        assert_eq!(stored.size, 14);
        assert!(stored.blob_ref.as_str().ends_with("-dune.pdf"));
        assert!(backend.exists(&stored.blob_ref).await.unwrap());
        assert_eq!(read_all(&backend, &stored.blob_ref).await, b"%PDF-1.7 hello");

        let head = backend.head(&stored.blob_ref).await.unwrap();
        assert_eq!(head.size, 14);
        assert_eq!(head.content_type.as_deref(), Some("application/pdf"));
    }

    #[tokio::test]
    async fn test_same_name_gets_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let a = backend.put("same.pdf", content(b"first"), &pdf_meta()).await.unwrap();
        let b = backend.put("same.pdf", content(b"second"), &pdf_meta()).await.unwrap();

        assert_ne!(a.blob_ref, b.blob_ref);
        assert_eq!(read_all(&backend, &a.blob_ref).await, b"first");
        assert_eq!(read_all(&backend, &b.blob_ref).await, b"second");
    }

    #[tokio::test]
    async fn test_publish_never_clobbers() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let (blob_ref, mut upload) = backend.put_stream("book.pdf", &pdf_meta()).await.unwrap();
        upload.write(Bytes::from_static(b"new")).await.unwrap();

        // Someone else publishes under the same key first.
        std::fs::write(dir.path().join(blob_ref.as_str()), b"existing").unwrap();

        let err = upload.finish().await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert_eq!(read_all(&backend, &blob_ref).await, b"existing");
        assert_eq!(file_names(dir.path()), vec![blob_ref.to_string()]);
    }

    #[tokio::test]
    async fn test_source_error_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let broken: UploadStream<'static> = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(StorageError::Source("client went away".to_string())),
        ]));

        let err = backend.put("broken.pdf", broken, &pdf_meta()).await.unwrap_err();
        assert!(matches!(err, StorageError::Source(_)));
        assert!(file_names(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_abort_removes_staged_data() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let (blob_ref, mut upload) = backend.put_stream("a.pdf", &pdf_meta()).await.unwrap();
        upload.write(Bytes::from_static(b"data")).await.unwrap();
        assert_eq!(file_names(dir.path()).len(), 1);

        upload.abort().await.unwrap();
        assert!(file_names(dir.path()).is_empty());
        assert!(!backend.exists(&blob_ref).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_removes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let stored = backend.put("x.pdf", content(b"abc"), &pdf_meta()).await.unwrap();
        assert_eq!(file_names(dir.path()).len(), 2);

        backend.delete(&stored.blob_ref).await.unwrap();
        assert!(file_names(dir.path()).is_empty());

        backend.delete(&stored.blob_ref).await.unwrap();
        assert!(matches!(
            backend.get(&stored.blob_ref).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        for name in ["", ".", "..", "a/b.pdf", "..\\x.pdf"] {
            assert!(
                backend.put_stream(name, &pdf_meta()).await.is_err(),
                "name {name:?} should be rejected"
            );
        }
        // Dots inside a name are fine.
        assert!(backend.put_stream("vol..2.pdf", &pdf_meta()).await.is_ok());
    }

    #[tokio::test]
    async fn test_overlong_name_is_invalid_key() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let name = format!("{}.pdf", "a".repeat(200));
        let err = backend.put_stream(&name, &pdf_meta()).await.err().unwrap();
        assert!(matches!(err, StorageError::InvalidKey(_)), "{err:?}");

        let fits = format!("{}.pdf", "a".repeat(MAX_NAME_BYTES - 4));
        let (_, upload) = backend.put_stream(&fits, &pdf_meta()).await.unwrap();
        upload.abort().await.unwrap();
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        for key in ["../escape", "/absolute/path", "foo/../bar", "foo/../../etc/passwd"] {
            assert!(backend.exists(&BlobRef::new(key)).await.is_err());
            assert!(backend.delete(&BlobRef::new(key)).await.is_err());
        }
        assert!(backend.exists(&BlobRef::new("valid-key.pdf")).await.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlink_traversal_rejected() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside_dir = tempfile::tempdir().unwrap();

        let outside_file = outside_dir.path().join("secret.pdf");
        std::fs::write(&outside_file, "secret data").unwrap();

        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        symlink(&outside_file, dir.path().join("malicious_link")).unwrap();

        match backend.get(&BlobRef::new("malicious_link")).await {
            Err(StorageError::InvalidKey(msg)) => assert!(msg.contains("escapes storage root")),
            Err(other) => panic!("expected InvalidKey error, got: {other:?}"),
            Ok(_) => panic!("symlink traversal should be rejected"),
        }

        // Delete through the link must not touch the outside file.
        assert!(backend.delete(&BlobRef::new("malicious_link")).await.is_err());
        assert!(outside_file.exists());
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().join("blobs")).await.unwrap();
        backend.health_check().await.unwrap();
        assert_eq!(backend.backend_name(), "filesystem");
    }
}
