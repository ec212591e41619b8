//! HTTP service for the bookshelf PDF store.
//!
//! This crate provides:
//! - The ingestion pipeline, which stores each uploaded PDF as a blob plus a
//!   metadata record and undoes the blob when the record cannot be written
//! - Consistency-preserving deletion of both halves
//! - Search and lookup over the metadata store
//! - The axum router, error mapping and Prometheus metrics

pub mod deletion;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod routes;
pub mod search;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use ingest::{IngestSession, IngestionPipeline, PendingBlob, UploadedFile};
pub use routes::create_router;
pub use state::AppState;
