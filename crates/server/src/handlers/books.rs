//! Book routes: upload, lookup, search, download and delete.

use crate::deletion::{self, BOOK_NOT_FOUND};
use crate::error::{ApiError, ApiResult};
use crate::ingest::{IngestSession, NO_FILE_UPLOADED, UploadedFile};
use crate::search;
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use shelf_core::api::{DataResponse, DeleteResponse, ListResponse, UploadResponse};
use shelf_core::{BookId, BookMetadata, BookQuery, BookView, PDF_MEDIA_TYPE};
use shelf_storage::{BlobRef, StorageError, UploadStream};

const BOOKS_RETRIEVED: &str = "Books retrieved successfully";
const NO_BOOKS_MATCH: &str = "No books found matching your search criteria";

/// GET /api/books - All books, oldest upload first.
pub async fn list_books(State(state): State<AppState>) -> ApiResult<Json<ListResponse<BookView>>> {
    let rows = state.metadata.list_books().await?;
    let books = rows.into_iter().map(BookView::from).collect();
    Ok(Json(ListResponse::with_message(BOOKS_RETRIEVED, books)))
}

/// GET /api/books/{id}
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DataResponse<BookView>>> {
    let id = BookId::parse(&id)?;
    let row = state
        .metadata
        .get_book(id.into_uuid())
        .await?
        .ok_or_else(|| ApiError::NotFound(BOOK_NOT_FOUND.to_string()))?;
    Ok(Json(DataResponse::new(BookView::from(row))))
}

/// GET /api/books/{id}/file - Stream the stored PDF.
pub async fn download_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = BookId::parse(&id)?;
    let row = state
        .metadata
        .get_book(id.into_uuid())
        .await?
        .ok_or_else(|| ApiError::NotFound(BOOK_NOT_FOUND.to_string()))?;
    let blob_ref = row
        .blob_ref
        .map(BlobRef::from)
        .ok_or_else(|| ApiError::NotFound(format!("no file stored for book {id}")))?;

    let meta = state.storage.head(&blob_ref).await?;
    let stream = state.storage.get(&blob_ref).await?;
    let body_stream = stream.map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        header_safe_file_name(&row.file_name)
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, HeaderValue::from_static(PDF_MEDIA_TYPE)),
            (CONTENT_LENGTH, HeaderValue::from(meta.size)),
            (CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(body_stream),
    )
        .into_response())
}

fn header_safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

/// DELETE /api/books/{id} - Remove the blob, then the record.
pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let id = BookId::parse(&id)?;
    let outcome = deletion::delete_book(state.storage.clone(), state.metadata.clone(), id).await?;
    Ok(Json(DeleteResponse::from_outcome(outcome)))
}

/// GET /api/books/search?title=&author=&category=
pub async fn search_books(
    State(state): State<AppState>,
    Query(query): Query<BookQuery>,
) -> ApiResult<Json<ListResponse<BookView>>> {
    run_search(&state, &query).await
}

/// POST /api/books/search with a JSON body.
pub async fn search_books_json(
    State(state): State<AppState>,
    body: Result<Json<BookQuery>, JsonRejection>,
) -> ApiResult<Json<ListResponse<BookView>>> {
    let Json(query) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    run_search(&state, &query).await
}

async fn run_search(state: &AppState, query: &BookQuery) -> ApiResult<Json<ListResponse<BookView>>> {
    let books = search::find_books(state.metadata.as_ref(), query).await?;
    if books.is_empty() {
        return Err(ApiError::NotFound(NO_BOOKS_MATCH.to_string()));
    }
    Ok(Json(ListResponse::new(books)))
}

/// GET /api/books/search/title/{title} - First book with this title.
pub async fn find_by_title(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> ApiResult<Json<DataResponse<BookView>>> {
    if title.trim().is_empty() {
        return Err(ApiError::BadRequest("Please provide a title".to_string()));
    }
    let book = search::find_book(state.metadata.as_ref(), &BookQuery::by_title(title))
        .await?
        .ok_or_else(|| ApiError::NotFound(BOOK_NOT_FOUND.to_string()))?;
    Ok(Json(DataResponse::new(book)))
}

/// GET /api/books/search/author/{author}
pub async fn find_by_author(
    State(state): State<AppState>,
    Path(author): Path<String>,
) -> ApiResult<Json<ListResponse<BookView>>> {
    if author.trim().is_empty() {
        return Err(ApiError::BadRequest("Please provide an author name".to_string()));
    }
    let books = search::find_books(state.metadata.as_ref(), &BookQuery::by_author(author)).await?;
    if books.is_empty() {
        return Err(ApiError::NotFound("No books found for this author".to_string()));
    }
    Ok(Json(ListResponse::new(books)))
}

/// GET /api/books/search/category/{category}
pub async fn find_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> ApiResult<Json<ListResponse<BookView>>> {
    if category.trim().is_empty() {
        return Err(ApiError::BadRequest("Please provide a category".to_string()));
    }
    let books =
        search::find_books(state.metadata.as_ref(), &BookQuery::by_category(category)).await?;
    if books.is_empty() {
        return Err(ApiError::NotFound("No books found in this category".to_string()));
    }
    Ok(Json(ListResponse::new(books)))
}

/// Shared text fields of an upload, collected before the first file part.
#[derive(Debug, Default)]
struct UploadFields {
    title: Option<String>,
    author: Option<String>,
    category: Option<String>,
    isbn: Option<String>,
}

impl UploadFields {
    fn set(&mut self, name: &str, value: String) {
        let slot = match name {
            "title" => &mut self.title,
            "author" => &mut self.author,
            "category" => &mut self.category,
            "isbn" => &mut self.isbn,
            other => {
                tracing::debug!(field = other, "Ignoring unknown upload field");
                return;
            }
        };
        *slot = Some(value);
    }

    fn book_metadata(&self) -> shelf_core::Result<BookMetadata> {
        BookMetadata::new(
            self.title.as_deref(),
            self.author.as_deref(),
            self.category.as_deref(),
            self.isbn.as_deref(),
        )
    }
}

fn malformed_multipart(err: MultipartError) -> ApiError {
    ApiError::BadRequest(format!("malformed multipart body: {}", err.body_text()))
}

fn uploaded_file(field: Field<'_>) -> UploadedFile<'_> {
    let original_name = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_string);
    let content: UploadStream<'_> = Box::pin(
        field.map(|chunk| chunk.map_err(|e| StorageError::Source(e.body_text()))),
    );
    UploadedFile {
        original_name,
        content_type,
        content,
    }
}

/// POST /api/books/upload - Multipart upload of one or more PDFs.
///
/// Text fields (`title`, `author`, `category`, optional `isbn`) must come
/// before the first file part. Each file part streams straight into the
/// blob store as it arrives.
pub async fn upload_books(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let mut fields = UploadFields::default();
    let mut session: Option<IngestSession<'_>> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => match &session {
                // Earlier files are already stored; report them.
                Some(s) if s.file_count() > 0 => {
                    tracing::warn!(error = %e, "Upload body ended abnormally");
                    break;
                }
                _ => return Err(malformed_multipart(e)),
            },
        };

        if field.file_name().is_none() {
            let name = field.name().unwrap_or_default().to_string();
            if session.is_some() {
                tracing::warn!(field = %name, "Ignoring text field sent after the first file");
                continue;
            }
            let value = field.text().await.map_err(malformed_multipart)?;
            fields.set(&name, value);
            continue;
        }

        if session.is_none() {
            session = Some(state.pipeline.session(fields.book_metadata()?));
        }
        if let Some(session) = session.as_mut() {
            session.ingest(uploaded_file(field)).await;
        }
    }

    let report = match session {
        Some(session) => session.finish()?,
        None => return Err(ApiError::BadRequest(NO_FILE_UPLOADED.to_string())),
    };

    Ok((StatusCode::CREATED, Json(UploadResponse::new(report))))
}
