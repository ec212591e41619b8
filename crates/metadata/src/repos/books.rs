//! Book record repository.

use crate::error::MetadataResult;
use crate::models::{BookFilter, BookRow, NewBookRow};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for book records.
#[async_trait]
pub trait BookRepo: Send + Sync {
    /// Insert a new record and return its assigned id.
    ///
    /// Fails with `AlreadyExists` when the ISBN is already taken.
    async fn insert_book(&self, book: &NewBookRow) -> MetadataResult<Uuid>;

    /// Get a record by id.
    async fn get_book(&self, book_id: Uuid) -> MetadataResult<Option<BookRow>>;

    /// First record matching `filter`, oldest upload first.
    async fn find_book(&self, filter: &BookFilter) -> MetadataResult<Option<BookRow>>;

    /// All records matching `filter`, oldest upload first.
    async fn find_books(&self, filter: &BookFilter) -> MetadataResult<Vec<BookRow>>;

    /// All records, oldest upload first.
    async fn list_books(&self) -> MetadataResult<Vec<BookRow>>;

    /// Delete a record. Returns whether a row was removed.
    async fn delete_book(&self, book_id: Uuid) -> MetadataResult<bool>;
}
