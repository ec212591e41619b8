//! Ingestion pipeline.
//!
//! Every accepted file goes through the same steps, independently of the
//! other files of its batch:
//!
//! 1. stream the size-limited content into a fresh blob (bounded by the
//!    per-file write timeout);
//! 2. publish the blob and insert its metadata record;
//! 3. if the insert fails, delete the blob again, exactly once.
//!
//! Step 1 runs on the request task and only ever leaves staged data behind,
//! which [`UploadGuard`] aborts on any exit. Steps 2 and 3 run in a detached
//! task holding a [`PendingBlob`], so a client disconnect cannot strand a
//! published blob without its record.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use bytes::Bytes;
use futures::{StreamExt, stream};
use shelf_core::book::{is_pdf_media_type, normalize_file_name};
use shelf_core::config::UploadConfig;
use shelf_core::{
    BookId, BookMetadata, FailedFile, FailureCode, FileOutcome, IngestionReport, PDF_MEDIA_TYPE,
    SucceededFile,
};
use shelf_metadata::{MetadataError, MetadataStore, NewBookRow};
use shelf_storage::{
    BlobMetadata, BlobRef, BlobStore, StorageError, UploadGuard, UploadStream, limit_size,
};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use time::macros::format_description;

/// Reason reported when a file is not a PDF.
pub const ONLY_PDF_ALLOWED: &str = "Only PDF files are allowed!";

/// Reason reported when a request carries no file at all.
pub const NO_FILE_UPLOADED: &str = "No file uploaded";

/// One file of an upload request.
pub struct UploadedFile<'a> {
    /// File name as sent by the client.
    pub original_name: String,
    /// Declared media type, if any.
    pub content_type: Option<String>,
    /// File content, streamed.
    pub content: UploadStream<'a>,
}

impl UploadedFile<'static> {
    /// Build a file from in-memory content.
    pub fn from_bytes(
        original_name: impl Into<String>,
        content_type: Option<&str>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            original_name: original_name.into(),
            content_type: content_type.map(str::to_string),
            content: Box::pin(stream::once(async move { Ok(data) })),
        }
    }
}

/// Writes uploaded PDFs to the blob store and records them in the metadata
/// store, keeping the two consistent per file.
#[derive(Clone)]
pub struct IngestionPipeline {
    storage: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    config: UploadConfig,
}

impl IngestionPipeline {
    pub fn new(
        storage: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        config: UploadConfig,
    ) -> Self {
        Self {
            storage,
            metadata,
            config,
        }
    }

    /// Ingest a batch of files sharing `metadata`.
    ///
    /// Fails as a whole only when there is nothing to ingest: no files, or no
    /// file declared as a PDF. In both cases nothing is written. Otherwise
    /// every file gets its own entry in the report, in input order.
    pub async fn ingest(
        &self,
        files: Vec<UploadedFile<'_>>,
        metadata: BookMetadata,
    ) -> ApiResult<IngestionReport> {
        if files.is_empty() {
            return Err(ApiError::BadRequest(NO_FILE_UPLOADED.to_string()));
        }
        if !files
            .iter()
            .any(|f| is_pdf_media_type(f.content_type.as_deref()))
        {
            return Err(ApiError::UnsupportedMediaType(ONLY_PDF_ALLOWED.to_string()));
        }

        let metadata = &metadata;
        let report = stream::iter(files)
            .map(|file| self.ingest_file(file, metadata))
            .buffered(self.config.max_concurrent_files.max(1))
            .collect::<IngestionReport>()
            .await;

        tracing::info!(
            total = report.total_files,
            succeeded = report.succeeded_count,
            failed = report.failed_count,
            "Ingestion batch finished"
        );
        Ok(report)
    }

    /// Start a session that ingests files one at a time as they arrive.
    pub fn session(&self, metadata: BookMetadata) -> IngestSession<'_> {
        IngestSession {
            pipeline: self,
            metadata,
            report: IngestionReport::default(),
        }
    }

    async fn ingest_file(&self, file: UploadedFile<'_>, metadata: &BookMetadata) -> FileOutcome {
        let started = Instant::now();
        let original_name = file.original_name.clone();

        let outcome = match self.store_file(file, metadata).await {
            Ok(record_id) => {
                metrics::BOOKS_INGESTED.inc();
                tracing::info!(file = %original_name, book_id = %record_id, "Book stored");
                FileOutcome::Succeeded(SucceededFile {
                    original_name,
                    record_id,
                })
            }
            Err(failed) => {
                metrics::record_ingest_failure(failed.code);
                tracing::warn!(
                    file = %failed.original_name,
                    code = %failed.code,
                    reason = %failed.reason,
                    cleanup_error = failed.cleanup_error.as_deref(),
                    "File not stored"
                );
                FileOutcome::Failed(failed)
            }
        };

        metrics::INGEST_DURATION.observe(started.elapsed().as_secs_f64());
        outcome
    }

    async fn store_file(
        &self,
        file: UploadedFile<'_>,
        metadata: &BookMetadata,
    ) -> Result<BookId, FailedFile> {
        let UploadedFile {
            original_name,
            content_type,
            content,
        } = file;

        if !is_pdf_media_type(content_type.as_deref()) {
            return Err(FailedFile::new(
                original_name,
                FailureCode::UnsupportedMediaType,
                ONLY_PDF_ALLOWED,
            ));
        }

        let file_name = normalize_file_name(&original_name).map_err(|e| {
            FailedFile::new(original_name.as_str(), FailureCode::ValidationError, e.to_string())
        })?;

        let blob_metadata = blob_metadata(metadata, &original_name);
        let timeout = self.config.blob_write_timeout();
        let max_file_size = self.config.max_file_size;

        let staged = tokio::time::timeout(timeout, async {
            let (blob_ref, upload) = self.storage.put_stream(&file_name, &blob_metadata).await?;
            let mut guard = UploadGuard::new(blob_ref, upload);
            match guard.write_all(limit_size(content, max_file_size)).await {
                Ok(_) => Ok::<_, StorageError>(guard),
                Err(e) => {
                    let blob_ref = guard.blob_ref().clone();
                    if let Err(abort_err) = guard.abort().await {
                        tracing::warn!(blob_ref = %blob_ref, error = %abort_err, "Failed to abort upload");
                    }
                    Err(e)
                }
            }
        })
        .await;

        // On timeout the guard was dropped inside the cancelled future and
        // its abort is already scheduled.
        let guard = match staged {
            Ok(Ok(guard)) => guard,
            Ok(Err(e)) => {
                return Err(FailedFile::new(original_name, storage_failure_code(&e), e.to_string()));
            }
            Err(_) => {
                return Err(FailedFile::new(
                    original_name,
                    FailureCode::StoreUnavailable,
                    format!("blob write timed out after {}s", timeout.as_secs()),
                ));
            }
        };

        let row = NewBookRow {
            title: metadata.title().to_string(),
            author: metadata.author().to_string(),
            category: metadata.category().to_string(),
            isbn: metadata.isbn().map(str::to_string),
            blob_ref: None,
            file_name,
            original_name: original_name.clone(),
            content_type: PDF_MEDIA_TYPE.to_string(),
            size_bytes: 0,
        };

        let commit = tokio::spawn(commit_staged(
            self.storage.clone(),
            self.metadata.clone(),
            guard,
            row,
        ));

        match commit.await {
            Ok(result) => result,
            Err(join_err) => Err(FailedFile::new(
                original_name,
                FailureCode::StoreUnavailable,
                format!("commit task failed: {join_err}"),
            )),
        }
    }
}

/// Publish a fully written blob and insert its record, compensating on failure.
async fn commit_staged(
    storage: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    guard: UploadGuard,
    row: NewBookRow,
) -> Result<BookId, FailedFile> {
    let blob_ref = guard.blob_ref().clone();
    let size = guard.finish().await.map_err(|e| {
        FailedFile::new(row.original_name.as_str(), storage_failure_code(&e), e.to_string())
    })?;

    let pending = PendingBlob::new(storage, blob_ref.clone());
    let row = NewBookRow {
        blob_ref: Some(blob_ref.into_string()),
        size_bytes: i64::try_from(size).unwrap_or(i64::MAX),
        ..row
    };

    match metadata.insert_book(&row).await {
        Ok(book_id) => {
            pending.commit();
            metrics::BYTES_UPLOADED.inc_by(size);
            Ok(BookId::from(book_id))
        }
        Err(e) => {
            let failed = match &e {
                MetadataError::AlreadyExists(_) => FailedFile::new(
                    row.original_name.as_str(),
                    FailureCode::Conflict,
                    format!(
                        "a book with ISBN {} already exists",
                        row.isbn.as_deref().unwrap_or_default()
                    ),
                ),
                _ => FailedFile::new(
                    row.original_name.as_str(),
                    FailureCode::StoreUnavailable,
                    e.to_string(),
                ),
            };

            match pending.rollback().await {
                Ok(()) => Err(failed),
                Err(cleanup) => Err(failed.with_cleanup_error(cleanup.to_string())),
            }
        }
    }
}

fn storage_failure_code(err: &StorageError) -> FailureCode {
    match err {
        StorageError::TooLarge { .. } => FailureCode::FileTooLarge,
        StorageError::Source(_) | StorageError::InvalidKey(_) => FailureCode::ValidationError,
        _ => FailureCode::StoreUnavailable,
    }
}

fn blob_metadata(metadata: &BookMetadata, original_name: &str) -> BlobMetadata {
    let upload_date = OffsetDateTime::now_utc()
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default();

    BlobMetadata::new(PDF_MEDIA_TYPE)
        .with_attribute("title", metadata.title())
        .with_attribute("author", metadata.author())
        .with_attribute("category", metadata.category())
        .with_attribute("original_name", original_name)
        .with_attribute("upload_date", upload_date)
}

/// A published blob whose metadata record is not in place yet.
///
/// Resolved by exactly one of [`commit`](Self::commit) or
/// [`rollback`](Self::rollback). Dropping it unresolved, as when the owning
/// task panics, schedules the delete on the current runtime.
pub struct PendingBlob {
    storage: Arc<dyn BlobStore>,
    blob_ref: BlobRef,
    armed: bool,
}

impl PendingBlob {
    pub fn new(storage: Arc<dyn BlobStore>, blob_ref: BlobRef) -> Self {
        Self {
            storage,
            blob_ref,
            armed: true,
        }
    }

    pub fn blob_ref(&self) -> &BlobRef {
        &self.blob_ref
    }

    /// The record now references the blob; keep it.
    pub fn commit(mut self) {
        self.armed = false;
    }

    /// Delete the blob. Runs once, never retried.
    pub async fn rollback(mut self) -> Result<(), StorageError> {
        self.armed = false;
        metrics::BLOB_ROLLBACKS.inc();

        match self.storage.delete(&self.blob_ref).await {
            Ok(()) => {
                tracing::info!(blob_ref = %self.blob_ref, "Rolled back blob after failed insert");
                Ok(())
            }
            Err(e) => {
                metrics::BLOB_ROLLBACK_FAILURES.inc();
                tracing::error!(
                    blob_ref = %self.blob_ref,
                    error = %e,
                    "Failed to roll back blob, it is now orphaned"
                );
                Err(e)
            }
        }
    }
}

impl Drop for PendingBlob {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let storage = self.storage.clone();
        let blob_ref = self.blob_ref.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                metrics::BLOB_ROLLBACKS.inc();
                handle.spawn(async move {
                    if let Err(e) = storage.delete(&blob_ref).await {
                        metrics::BLOB_ROLLBACK_FAILURES.inc();
                        tracing::error!(blob_ref = %blob_ref, error = %e, "Failed to delete unresolved blob");
                    } else {
                        tracing::info!(blob_ref = %blob_ref, "Deleted unresolved blob");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    blob_ref = %blob_ref,
                    "PendingBlob dropped without runtime handle - blob may be orphaned"
                );
            }
        }
    }
}

/// Incremental ingestion for files that arrive one after another, such as
/// the parts of a multipart body.
pub struct IngestSession<'p> {
    pipeline: &'p IngestionPipeline,
    metadata: BookMetadata,
    report: IngestionReport,
}

impl IngestSession<'_> {
    /// Run one file through the pipeline and record its outcome.
    pub async fn ingest(&mut self, file: UploadedFile<'_>) {
        let outcome = self.pipeline.ingest_file(file, &self.metadata).await;
        self.report.push(outcome);
    }

    /// Files seen so far.
    pub fn file_count(&self) -> usize {
        self.report.total_files
    }

    /// Close the session.
    ///
    /// Fails when no file arrived, or when every file was rejected for its
    /// media type (nothing was written in that case).
    pub fn finish(self) -> ApiResult<IngestionReport> {
        if self.report.total_files == 0 {
            return Err(ApiError::BadRequest(NO_FILE_UPLOADED.to_string()));
        }
        if self.report.all_rejected_media_type() {
            return Err(ApiError::UnsupportedMediaType(ONLY_PDF_ALLOWED.to_string()));
        }

        tracing::info!(
            total = self.report.total_files,
            succeeded = self.report.succeeded_count,
            failed = self.report.failed_count,
            "Ingestion session finished"
        );
        Ok(self.report)
    }
}
