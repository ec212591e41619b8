//! Test fixtures for generating upload data.
//! Note: #[allow(dead_code)] because each test file compiles common/ separately.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use serde_json::Value;
use shelf_core::BookMetadata;
use tower::ServiceExt;

pub const BOUNDARY: &str = "shelf-test-boundary";

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// A small PDF-looking payload of `len` bytes.
pub fn pdf_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = b"%PDF-1.7\n".to_vec();
    data.extend_from_slice(&seeded_bytes(seed, len.saturating_sub(data.len())));
    data.truncate(len);
    Bytes::from(data)
}

pub fn dune_metadata(isbn: Option<&str>) -> BookMetadata {
    BookMetadata::new(Some("Dune"), Some("Frank Herbert"), Some("Sci-Fi"), isbn).unwrap()
}

/// One part of a multipart upload body.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        field: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

pub fn pdf_part<'a>(file_name: &'a str, data: &'a [u8]) -> Part<'a> {
    Part::File {
        field: "files",
        file_name,
        content_type: "application/pdf",
        data,
    }
}

/// Encode parts as a `multipart/form-data` body.
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                field,
                file_name,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Standard metadata text parts followed by `files`.
pub fn upload_parts<'a>(
    title: &'a str,
    author: &'a str,
    category: &'a str,
    isbn: Option<&'a str>,
    files: Vec<Part<'a>>,
) -> Vec<Part<'a>> {
    let mut parts = vec![
        Part::Text("title", title),
        Part::Text("author", author),
        Part::Text("category", category),
    ];
    if let Some(isbn) = isbn {
        parts.push(Part::Text("isbn", isbn));
    }
    parts.extend(files);
    parts
}

/// POST a multipart body to the upload route.
pub async fn upload(router: &axum::Router, parts: &[Part<'_>]) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/books/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap();
    send(router, request).await
}

/// Send a JSON (or empty) request.
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };
    send(router, builder.body(body).unwrap()).await
}

async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}
