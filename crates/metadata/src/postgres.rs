//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{BookFilter, BookRow, NewBookRow, creation_timestamp};
use crate::repos::BookRepo;
use crate::store::MetadataStore;
use async_trait::async_trait;
use shelf_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres, QueryBuilder};
use std::str::FromStr;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// Lets the password come from its own environment variable instead of
    /// being embedded in a URL.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    fn select_books<'a>(
        filter: &'a BookFilter,
        limit: Option<i64>,
    ) -> QueryBuilder<'a, Postgres> {
        let mut qb = QueryBuilder::new("SELECT * FROM books WHERE TRUE");
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
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot hold several commands, so run them one by one.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
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
impl BookRepo for PostgresStore {
    async fn insert_book(&self, book: &NewBookRow) -> MetadataResult<Uuid> {
        let book_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO books (
                book_id, title, author, category, isbn, blob_ref,
                file_name, original_name, content_type, size_bytes, uploaded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
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

        Ok(book_id)
    }

    async fn get_book(&self, book_id: Uuid) -> MetadataResult<Option<BookRow>> {
        let row = sqlx::query_as::<_, BookRow>("SELECT * FROM books WHERE book_id = $1")
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_book(&self, filter: &BookFilter) -> MetadataResult<Option<BookRow>> {
        let row = Self::select_books(filter, Some(1))
            .build_query_as::<BookRow>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_books(&self, filter: &BookFilter) -> MetadataResult<Vec<BookRow>> {
        let rows = Self::select_books(filter, None)
            .build_query_as::<BookRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_books(&self) -> MetadataResult<Vec<BookRow>> {
        self.find_books(&BookFilter::default()).await
    }

    async fn delete_book(&self, book_id: Uuid) -> MetadataResult<bool> {
        let result = sqlx::query("DELETE FROM books WHERE book_id = $1")
            .bind(book_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
