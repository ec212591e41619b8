//! Application state shared across handlers.

use crate::ingest::IngestionPipeline;
use shelf_core::config::AppConfig;
use shelf_metadata::MetadataStore;
use shelf_storage::BlobStore;
use std::sync::Arc;

/// Store handles and configuration, opened once at startup and injected.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<AppConfig>,
    /// Blob store holding the PDF bytes.
    pub storage: Arc<dyn BlobStore>,
    /// Metadata store holding one record per stored PDF.
    pub metadata: Arc<dyn MetadataStore>,
    /// Ingestion pipeline over the two stores.
    pub pipeline: IngestionPipeline,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let pipeline =
            IngestionPipeline::new(storage.clone(), metadata.clone(), config.upload.clone());
        Self {
            config: Arc::new(config),
            storage,
            metadata,
            pipeline,
        }
    }
}
