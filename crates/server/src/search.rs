//! Search and lookup over the metadata store.
//!
//! Queries are normalized the same way ingestion normalizes stored values,
//! so matching is exact on the lowercased form.

use crate::error::{ApiError, ApiResult};
use shelf_core::{BookQuery, BookView};
use shelf_metadata::{BookFilter, MetadataStore};

pub const MISSING_SEARCH_PARAMETER: &str =
    "Please provide at least one search parameter (title, author, or category)";

/// Turn a client query into a store filter.
///
/// Blank values are dropped; at least one value must remain.
pub fn build_filter(query: &BookQuery) -> ApiResult<BookFilter> {
    if query.is_empty() {
        return Err(ApiError::BadRequest(MISSING_SEARCH_PARAMETER.to_string()));
    }
    let query = query.normalized();
    Ok(BookFilter {
        title: query.title,
        author: query.author,
        category: query.category,
    })
}

/// Every record matching `query`, oldest upload first.
pub async fn find_books(metadata: &dyn MetadataStore, query: &BookQuery) -> ApiResult<Vec<BookView>> {
    let filter = build_filter(query)?;
    let rows = metadata.find_books(&filter).await?;
    Ok(rows.into_iter().map(BookView::from).collect())
}

/// The first record matching `query`.
pub async fn find_book(metadata: &dyn MetadataStore, query: &BookQuery) -> ApiResult<Option<BookView>> {
    let filter = build_filter(query)?;
    Ok(metadata.find_book(&filter).await?.map(BookView::from))
}
