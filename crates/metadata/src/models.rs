//! Database models mapping to the metadata schema.

use shelf_core::{BookId, BookView};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Books
// =============================================================================

/// Book record as stored.
#[derive(Debug, Clone, FromRow)]
pub struct BookRow {
    pub book_id: Uuid,
    pub title: String,
    pub author: String,
    pub category: String,
    pub isbn: Option<String>,
    /// Key of the PDF in the blob store. `None` only for rows written by
    /// tooling outside the upload path.
    pub blob_ref: Option<String>,
    pub file_name: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_at: OffsetDateTime,
}

impl BookRow {
    pub fn id(&self) -> BookId {
        BookId::from(self.book_id)
    }
}

impl From<BookRow> for BookView {
    fn from(row: BookRow) -> Self {
        BookView {
            id: BookId::from(row.book_id),
            title: row.title,
            author: row.author,
            category: row.category,
            isbn: row.isbn,
            blob_ref: row.blob_ref,
            file_name: row.file_name,
            original_name: row.original_name,
            content_type: row.content_type,
            size_bytes: u64::try_from(row.size_bytes).unwrap_or_default(),
            uploaded_at: row.uploaded_at,
        }
    }
}

/// Values for a new book record. The store assigns `book_id` and `uploaded_at`.
#[derive(Debug, Clone)]
pub struct NewBookRow {
    pub title: String,
    pub author: String,
    pub category: String,
    pub isbn: Option<String>,
    pub blob_ref: Option<String>,
    pub file_name: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
}

/// Creation timestamp for a new record.
///
/// Truncated to microseconds so it survives a round-trip through either
/// backend unchanged.
pub(crate) fn creation_timestamp() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_microsecond(now.microsecond()).unwrap_or(now)
}

// =============================================================================
// Search
// =============================================================================

/// Conjunctive exact-match filter over the searchable columns.
///
/// Values are compared as given; callers normalize them first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilter {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
}

impl BookFilter {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.author.is_none() && self.category.is_none()
    }

    /// Column/value pairs for every set field, in a fixed column order.
    pub(crate) fn conditions(&self) -> Vec<(&'static str, &str)> {
        [
            ("title", self.title.as_deref()),
            ("author", self.author.as_deref()),
            ("category", self.category.as_deref()),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.map(|v| (column, v)))
        .collect()
    }
}
