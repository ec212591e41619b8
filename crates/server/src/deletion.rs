//! Consistency-preserving deletion.
//!
//! The blob goes first, then the record. A failed blob delete is reported
//! but does not stop the record delete, so the store never keeps a record
//! pointing at a blob in an unknown state.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use shelf_core::{BookId, DeletionOutcome};
use shelf_metadata::MetadataStore;
use shelf_storage::{BlobRef, BlobStore};
use std::sync::Arc;

pub const BOOK_NOT_FOUND: &str = "Book not found";

/// Delete a book and its blob.
///
/// Runs in a detached task: once started, the sequence completes even if the
/// caller goes away.
pub async fn delete_book(
    storage: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    id: BookId,
) -> ApiResult<DeletionOutcome> {
    tokio::spawn(run_deletion(storage, metadata, id))
        .await
        .map_err(|e| ApiError::Internal(format!("deletion task failed: {e}")))?
}

async fn run_deletion(
    storage: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    id: BookId,
) -> ApiResult<DeletionOutcome> {
    let book_id = id.into_uuid();
    let row = metadata
        .get_book(book_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(BOOK_NOT_FOUND.to_string()))?;

    let mut outcome = DeletionOutcome {
        id,
        blob_ref: row.blob_ref.clone(),
        blob_deleted: false,
        blob_error: None,
    };

    if let Some(blob_ref) = row.blob_ref.map(BlobRef::from) {
        match storage.delete(&blob_ref).await {
            Ok(()) => outcome.blob_deleted = true,
            Err(e) => {
                metrics::BLOB_DELETE_FAILURES.inc();
                tracing::error!(
                    book_id = %id,
                    blob_ref = %blob_ref,
                    error = %e,
                    "Failed to delete blob, removing record anyway"
                );
                outcome.blob_error = Some(e.to_string());
            }
        }
    }

    if metadata.delete_book(book_id).await? {
        metrics::BOOKS_DELETED.inc();
        tracing::info!(book_id = %id, blob_deleted = outcome.blob_deleted, "Book deleted");
    } else {
        tracing::debug!(book_id = %id, "Record already removed by a concurrent delete");
    }

    Ok(outcome)
}
