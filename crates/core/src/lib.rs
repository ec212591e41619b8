//! Core domain types and shared logic for the bookshelf service.
//!
//! This crate defines the data model used across all other crates:
//! - Book identity, upload metadata and normalization rules
//! - Per-file ingestion reports and deletion outcomes
//! - JSON response envelopes
//! - Configuration

pub mod api;
pub mod book;
pub mod config;
pub mod error;
pub mod report;

pub use api::BookView;
pub use book::{BookId, BookMetadata, BookQuery, MAX_FILE_NAME_BYTES, PDF_MEDIA_TYPE};
pub use error::{Error, Result};
pub use report::{DeletionOutcome, FailedFile, FailureCode, FileOutcome, IngestionReport, SucceededFile};
