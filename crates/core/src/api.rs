//! JSON response envelopes shared by the HTTP layer and its clients.

use crate::book::BookId;
use crate::report::{DeletionOutcome, IngestionReport};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A stored book as returned to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookView {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub category: String,
    pub isbn: Option<String>,
    pub blob_ref: Option<String>,
    pub file_name: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
}

/// `{success, message?, data}`
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

/// `{success, message?, count, data: [...]}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub count: usize,
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            success: true,
            message: None,
            count: data.len(),
            data,
        }
    }

    pub fn with_message(message: impl Into<String>, data: Vec<T>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(data)
        }
    }
}

/// Upload response: `{success, message, summary}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub summary: IngestionReport,
}

impl UploadResponse {
    pub fn new(summary: IngestionReport) -> Self {
        let message = match (summary.succeeded_count, summary.failed_count) {
            (_, 0) => "Books uploaded successfully".to_string(),
            (0, _) => "No books were uploaded".to_string(),
            (ok, failed) => format!("{ok} book(s) uploaded, {failed} failed"),
        };
        Self {
            success: true,
            message,
            summary,
        }
    }
}

/// Delete response: `{success, message, data}`.
pub type DeleteResponse = DataResponse<DeletionOutcome>;

impl DeleteResponse {
    pub fn from_outcome(outcome: DeletionOutcome) -> Self {
        let message = if outcome.is_complete() {
            "Book deleted successfully"
        } else {
            "Book metadata deleted, blob deletion failed"
        };
        Self::with_message(message, outcome)
    }
}
