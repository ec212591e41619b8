#![allow(dead_code)]

use bytes::Bytes;
use futures::StreamExt;
use shelf_storage::{BlobRef, BlobStore, UploadStream};
use std::path::Path;

/// Generate deterministic test data using a seeded pseudo-random generator.
/// Same seed produces same output (reproducible tests).
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Split `data` into an upload stream of `chunk_size` pieces.
pub fn chunked(data: Bytes, chunk_size: usize) -> UploadStream<'static> {
    let chunks: Vec<_> = (0..data.len())
        .step_by(chunk_size)
        .map(|start| Ok(data.slice(start..(start + chunk_size).min(data.len()))))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

/// Yield `data` and then never complete, like a client that stalls mid-upload.
pub fn pending_after(data: Bytes) -> UploadStream<'static> {
    Box::pin(futures::stream::once(async move { Ok(data) }).chain(futures::stream::pending()))
}

/// Read a blob back fully.
pub async fn read_all(store: &dyn BlobStore, blob_ref: &BlobRef) -> Vec<u8> {
    let mut stream = store.get(blob_ref).await.unwrap();
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

/// Sorted file names directly under `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(42, 1000);
        assert_eq!(data1, data2);
    }

    #[test]
    fn test_seeded_bytes_different_seeds() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(43, 1000);
        assert_ne!(data1, data2);
    }
}
