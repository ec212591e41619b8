//! Metadata store test utilities.
#![allow(dead_code)]

use async_trait::async_trait;
use shelf_metadata::{
    BookFilter, BookRepo, BookRow, MetadataError, MetadataResult, MetadataStore, NewBookRow,
    PostgresStore, SqliteStore,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

/// Stable prefix for Docker/container startup failures in Postgres test setup.
/// Tests use this marker to decide whether to skip due to unavailable Docker.
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

/// A file-backed SQLite store that cleans up on drop.
pub struct TestMetadata {
    pub store: Arc<dyn MetadataStore>,
    _temp_dir: TempDir,
}

impl TestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(temp_dir.path().join("test.db"), None).await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}

/// PostgreSQL test store backed by a testcontainer.
pub struct PostgresTestMetadata {
    pub store: Arc<dyn MetadataStore>,
    _container: ContainerAsync<Postgres>,
}

impl PostgresTestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|e| {
                MetadataError::Config(format!(
                    "{} Failed to start PostgreSQL container: {e}",
                    POSTGRES_CONTAINER_START_ERR_PREFIX
                ))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        // Default credentials from testcontainers-modules postgres
        let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);
        let store = PostgresStore::from_url(&url, 5, None).await?;

        Ok(Self {
            store: Arc::new(store),
            _container: container,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}

/// Run a test against both SQLite and PostgreSQL backends.
pub async fn run_metadata_test_both<F, Fut>(test_fn: F)
where
    F: Fn(Arc<dyn MetadataStore>) -> Fut + Clone,
    Fut: std::future::Future<Output = ()>,
{
    let sqlite = TestMetadata::new()
        .await
        .expect("Failed to create SQLite test metadata");
    test_fn.clone()(sqlite.store()).await;

    // Requires Docker
    if std::env::var("SKIP_POSTGRES_TESTS").is_err() {
        match PostgresTestMetadata::new().await {
            Ok(postgres) => test_fn(postgres.store()).await,
            Err(err) => eprintln!("Skipping PostgreSQL metadata tests: {err}"),
        }
    }
}

/// Metadata store wrapper whose inserts can be made to fail.
pub struct FaultyMetadata {
    inner: Arc<dyn MetadataStore>,
    pub fail_insert: AtomicBool,
}

impl FaultyMetadata {
    pub fn new(inner: Arc<dyn MetadataStore>) -> Self {
        Self {
            inner,
            fail_insert: AtomicBool::new(false),
        }
    }

    pub fn set_fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BookRepo for FaultyMetadata {
    async fn insert_book(&self, book: &NewBookRow) -> MetadataResult<Uuid> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(MetadataError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.insert_book(book).await
    }

    async fn get_book(&self, book_id: Uuid) -> MetadataResult<Option<BookRow>> {
        self.inner.get_book(book_id).await
    }

    async fn find_book(&self, filter: &BookFilter) -> MetadataResult<Option<BookRow>> {
        self.inner.find_book(filter).await
    }

    async fn find_books(&self, filter: &BookFilter) -> MetadataResult<Vec<BookRow>> {
        self.inner.find_books(filter).await
    }

    async fn list_books(&self) -> MetadataResult<Vec<BookRow>> {
        self.inner.list_books().await
    }

    async fn delete_book(&self, book_id: Uuid) -> MetadataResult<bool> {
        self.inner.delete_book(book_id).await
    }
}

#[async_trait]
impl MetadataStore for FaultyMetadata {
    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}
