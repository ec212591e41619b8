//! Size-limiting adapter for upload streams.

use crate::error::StorageError;
use crate::traits::UploadStream;
use futures::StreamExt;

/// Wrap `content` so it fails with [`StorageError::TooLarge`] as soon as more
/// than `max` bytes have passed through.
///
/// The chunk that crosses the limit is never yielded.
pub fn limit_size(content: UploadStream<'_>, max: u64) -> UploadStream<'_> {
    Box::pin(async_stream::try_stream! {
        let mut content = content;
        let mut total: u64 = 0;
        while let Some(chunk) = content.next().await {
            let chunk = chunk?;
            total = total.saturating_add(chunk.len() as u64);
            if total > max {
                Err(StorageError::TooLarge { limit: max })?;
            }
            yield chunk;
        }
    })
}
