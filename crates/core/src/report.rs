//! Per-file ingestion results and deletion outcomes.

use crate::book::BookId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a single file of a batch was not stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// Declared media type is not `application/pdf`.
    UnsupportedMediaType,
    /// Content exceeded the configured per-file limit.
    FileTooLarge,
    /// A record with the same ISBN already exists.
    Conflict,
    /// Blob or metadata store failed, or the write timed out.
    StoreUnavailable,
    /// The file itself was unusable (bad name, broken client stream).
    ValidationError,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedMediaType => "unsupported_media_type",
            Self::FileTooLarge => "file_too_large",
            Self::Conflict => "conflict",
            Self::StoreUnavailable => "store_unavailable",
            Self::ValidationError => "validation_error",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SucceededFile {
    pub original_name: String,
    pub record_id: BookId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedFile {
    pub original_name: String,
    pub code: FailureCode,
    pub reason: String,
    /// Set when the compensating blob delete failed too.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_error: Option<String>,
}

impl FailedFile {
    pub fn new(original_name: impl Into<String>, code: FailureCode, reason: impl Into<String>) -> Self {
        Self {
            original_name: original_name.into(),
            code,
            reason: reason.into(),
            cleanup_error: None,
        }
    }

    pub fn with_cleanup_error(mut self, cleanup_error: impl Into<String>) -> Self {
        self.cleanup_error = Some(cleanup_error.into());
        self
    }
}

/// Result of running one file through the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileOutcome {
    Succeeded(SucceededFile),
    Failed(FailedFile),
}

/// Batch summary returned by an upload.
///
/// `succeeded` and `failed` each preserve the order in which files were
/// submitted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub total_files: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub succeeded: Vec<SucceededFile>,
    pub failed: Vec<FailedFile>,
}

impl IngestionReport {
    /// Record one more outcome.
    pub fn push(&mut self, outcome: FileOutcome) {
        self.total_files += 1;
        match outcome {
            FileOutcome::Succeeded(file) => {
                self.succeeded_count += 1;
                self.succeeded.push(file);
            }
            FileOutcome::Failed(file) => {
                self.failed_count += 1;
                self.failed.push(file);
            }
        }
    }

    /// True when at least one file failed the media-type screen and nothing
    /// else happened.
    pub fn all_rejected_media_type(&self) -> bool {
        self.total_files > 0
            && self.succeeded_count == 0
            && self
                .failed
                .iter()
                .all(|f| f.code == FailureCode::UnsupportedMediaType)
    }
}

impl Extend<FileOutcome> for IngestionReport {
    fn extend<I: IntoIterator<Item = FileOutcome>>(&mut self, iter: I) {
        for outcome in iter {
            self.push(outcome);
        }
    }
}

impl FromIterator<FileOutcome> for IngestionReport {
    fn from_iter<I: IntoIterator<Item = FileOutcome>>(iter: I) -> Self {
        let mut report = Self::default();
        report.extend(iter);
        report
    }
}

/// Result of a consistency-preserving delete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionOutcome {
    pub id: BookId,
    pub blob_ref: Option<String>,
    pub blob_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_error: Option<String>,
}

impl DeletionOutcome {
    /// Whether both stores were cleaned up.
    pub fn is_complete(&self) -> bool {
        self.blob_error.is_none()
    }
}
