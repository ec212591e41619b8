//! Server test utilities.
#![allow(dead_code)]

use super::metadata::FaultyMetadata;
use super::storage::FaultyStorage;
use super::fixtures::pdf_bytes;
use shelf_core::config::{AppConfig, MetadataConfig, StorageConfig};
use shelf_core::{BookId, BookMetadata};
use shelf_metadata::{MetadataStore, SqliteStore};
use shelf_server::{AppState, UploadedFile, create_router};
use std::sync::Arc;
use tempfile::TempDir;

/// A router over real stores in a temporary directory, with fault switches
/// on both stores.
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub storage: Arc<FaultyStorage>,
    pub metadata: Arc<FaultyMetadata>,
    _temp_dir: TempDir,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a server after applying `modify` to the test configuration.
    pub async fn with_config(modify: impl FnOnce(&mut AppConfig)) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let storage = Arc::new(FaultyStorage::new(&storage_path).await);

        let db_path = temp_dir.path().join("metadata.db");
        let sqlite: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );
        let metadata = Arc::new(FaultyMetadata::new(sqlite));

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem { path: storage_path };
        config.metadata = MetadataConfig::Sqlite {
            path: db_path,
            query_timeout_secs: None,
        };
        modify(&mut config);

        let state = AppState::new(config, storage.clone(), metadata.clone());
        let router = create_router(state.clone());

        Self {
            router,
            state,
            storage,
            metadata,
            _temp_dir: temp_dir,
        }
    }

    pub fn metadata_store(&self) -> Arc<dyn MetadataStore> {
        self.metadata.clone()
    }

    /// Store one PDF through the ingestion pipeline and return its id.
    pub async fn add_book(&self, title: &str, author: &str, category: &str) -> BookId {
        let metadata = BookMetadata::new(Some(title), Some(author), Some(category), None)
            .expect("valid metadata");
        let file = UploadedFile::from_bytes(
            format!("{title}.pdf"),
            Some("application/pdf"),
            pdf_bytes(title.len() as u64, 128),
        );
        let report = self
            .state
            .pipeline
            .ingest(vec![file], metadata)
            .await
            .expect("ingest");
        match report.succeeded.first() {
            Some(file) => file.record_id,
            None => panic!("book not stored: {:?}", report.failed),
        }
    }
}
