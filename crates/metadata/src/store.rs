//! SQLite-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{BookFilter, BookRow, NewBookRow, creation_timestamp};
use crate::repos::BookRepo;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: BookRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Close the connection pool. Later calls fail.
    async fn close(&self);
}

const IN_MEMORY: &str = ":memory:";

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`, or an in-memory
    /// database for `:memory:`.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(30));
        let in_memory = path.as_os_str() == IN_MEMORY;

        let opts = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MetadataError::Config(format!(
                        "failed to create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        };

        let opts = opts
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let mut pool_opts = SqlitePoolOptions::new()
            // One connection serializes writers and keeps an in-memory
            // database alive for the lifetime of the pool.
            .max_connections(1);
        if in_memory {
            pool_opts = pool_opts
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_opts.connect_with(opts).await?;

        let store = Self {
            pool,
            query_timeout,
        };
        store.migrate().await?;

        tracing::info!(
            path = %path.display(),
            query_timeout_secs = query_timeout.as_secs(),
            "Opened SQLite metadata store (query timeout is advisory)"
        );

        Ok(store)
    }

    /// Run a query, logging it when it outlives the advisory timeout.
    ///
    /// SQLite has no statement cancellation, so the query always runs to
    /// completion.
    async fn timed<T>(
        &self,
        operation: &'static str,
        query: impl Future<Output = MetadataResult<T>>,
    ) -> MetadataResult<T> {
        let started = Instant::now();
        let result = query.await;
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = self.query_timeout.as_millis() as u64,
                "SQLite query exceeded advisory timeout"
            );
        }
        result
    }

    fn select_books<'a>(filter: &'a BookFilter, limit: Option<i64>) -> QueryBuilder<'a, Sqlite> {
        let mut qb = QueryBuilder::new("SELECT * FROM books WHERE 1 = 1");
        for (column, value) in filter.conditions() {
            qb.push(" AND ").push(column).push(" = ").push_bind(value);
        }
        qb.push(" ORDER BY uploaded_at, book_id");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        qb
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl BookRepo for SqliteStore {
    async fn insert_book(&self, book: &NewBookRow) -> MetadataResult<Uuid> {
        let book_id = Uuid::new_v4();
        self.timed("insert_book", async {
            sqlx::query(
                r#"
                INSERT INTO books (
                    book_id, title, author, category, isbn, blob_ref,
                    file_name, original_name, content_type, size_bytes, uploaded_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(book_id)
            .bind(&book.title)
            .bind(&book.author)
            .bind(&book.category)
            .bind(&book.isbn)
            .bind(&book.blob_ref)
            .bind(&book.file_name)
            .bind(&book.original_name)
            .bind(&book.content_type)
            .bind(book.size_bytes)
            .bind(creation_timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MetadataError::from_insert(e, || {
                    format!("isbn {}", book.isbn.as_deref().unwrap_or_default())
                })
            })?;
            Ok::<_, MetadataError>(book_id)
        })
        .await
    }

    async fn get_book(&self, book_id: Uuid) -> MetadataResult<Option<BookRow>> {
        self.timed("get_book", async {
            let row = sqlx::query_as::<_, BookRow>("SELECT * FROM books WHERE book_id = ?")
                .bind(book_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok::<_, MetadataError>(row)
        })
        .await
    }

    async fn find_book(&self, filter: &BookFilter) -> MetadataResult<Option<BookRow>> {
        self.timed("find_book", async {
            let row = Self::select_books(filter, Some(1))
                .build_query_as::<BookRow>()
                .fetch_optional(&self.pool)
                .await?;
            Ok::<_, MetadataError>(row)
        })
        .await
    }

    async fn find_books(&self, filter: &BookFilter) -> MetadataResult<Vec<BookRow>> {
        self.timed("find_books", async {
            let rows = Self::select_books(filter, None)
                .build_query_as::<BookRow>()
                .fetch_all(&self.pool)
                .await?;
            Ok::<_, MetadataError>(rows)
        })
        .await
    }

    async fn list_books(&self) -> MetadataResult<Vec<BookRow>> {
        self.find_books(&BookFilter::default()).await
    }

    async fn delete_book(&self, book_id: Uuid) -> MetadataResult<bool> {
        self.timed("delete_book", async {
            let result = sqlx::query("DELETE FROM books WHERE book_id = ?")
                .bind(book_id)
                .execute(&self.pool)
                .await?;
            Ok::<_, MetadataError>(result.rows_affected() > 0)
        })
        .await
    }
}

/// SQLite schema.
///
/// The partial unique index lets any number of records omit the ISBN.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS books (
    book_id BLOB PRIMARY KEY,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    category TEXT NOT NULL,
    isbn TEXT,
    blob_ref TEXT,
    file_name TEXT NOT NULL,
    original_name TEXT NOT NULL,
    content_type TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    uploaded_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_books_isbn ON books(isbn) WHERE isbn IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_books_title ON books(title);
CREATE INDEX IF NOT EXISTS idx_books_author ON books(author);
CREATE INDEX IF NOT EXISTS idx_books_category ON books(category);
CREATE INDEX IF NOT EXISTS idx_books_blob_ref ON books(blob_ref);
CREATE INDEX IF NOT EXISTS idx_books_uploaded_at ON books(uploaded_at, book_id);
"#;
