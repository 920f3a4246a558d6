//! Staging of artifact bytes into transient buffer accounts.
//!
//! A buffer is allocated to the exact artifact length, filled with
//! chunk writes over disjoint byte ranges, and handed to activation only
//! once every chunk is confirmed. Ordering between chunks does not matter
//! for correctness; the confirmation barrier does.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use backon::Retryable;
use futures::{StreamExt, TryStreamExt, stream};
use tokio::sync::watch;

use crate::artifact::Artifact;
use crate::config::{DeployConfig, RetryConfig};
use crate::error::StageError;
use crate::gateway::{AccountId, ChainGateway, GatewayError};

/// Handle to a fully staged, confirmed buffer account.
#[derive(Debug, Clone)]
pub struct BufferHandle {
    pub id: AccountId,
    pub len: u64,
    pub chunks: usize,
    /// Content hash of the staged bytes; equals the artifact hash.
    pub content_hash: String,
}

/// Owns the lifecycle of staging buffer accounts for one pipeline.
pub struct BufferManager<G> {
    gateway: Arc<G>,
    chunk_size: usize,
    concurrency: usize,
    retry: RetryConfig,
}

impl<G: ChainGateway> BufferManager<G> {
    pub fn new(gateway: Arc<G>, config: &DeployConfig) -> Self {
        Self {
            gateway,
            chunk_size: config.chunk_size,
            concurrency: config.chunk_concurrency,
            retry: config.retry.clone(),
        }
    }

    /// Allocate a buffer sized to the artifact and upload every chunk,
    /// returning only once all writes are confirmed.
    ///
    /// On any failure or cancellation mid-upload the buffer is closed
    /// (best-effort) before the error is returned; callers never see a
    /// handle to a partially staged buffer.
    pub async fn stage(
        &self,
        artifact: &Artifact,
        cancel: &watch::Receiver<bool>,
        retries: &AtomicU32,
    ) -> Result<BufferHandle, StageError> {
        let authority = self.gateway.authority().clone();
        let buffer = self
            .gateway
            .create_account(artifact.len(), &authority)
            .await
            .map_err(StageError::Allocate)?;

        tracing::info!(buffer = %buffer, size = artifact.len(), "Buffer account allocated");

        match self.upload_chunks(&buffer, artifact, cancel, retries).await {
            Ok(chunks) => Ok(BufferHandle {
                id: buffer,
                len: artifact.len(),
                chunks,
                content_hash: artifact.hash().to_string(),
            }),
            Err(err) => {
                self.discard(&buffer).await;
                Err(err)
            }
        }
    }

    /// Upload all chunks with bounded concurrency and wait for every
    /// confirmation. Each chunk targets a disjoint byte range, so
    /// completion order is irrelevant.
    async fn upload_chunks(
        &self,
        buffer: &AccountId,
        artifact: &Artifact,
        cancel: &watch::Receiver<bool>,
        retries: &AtomicU32,
    ) -> Result<usize, StageError> {
        let ranges = chunk_ranges(artifact.len(), self.chunk_size);
        let total = ranges.len();

        tracing::debug!(
            buffer = %buffer,
            chunks = total,
            chunk_size = self.chunk_size,
            "Uploading chunks..."
        );

        stream::iter(ranges)
            .map(|(start, end)| {
                let cancel = cancel.clone();
                async move {
                    if *cancel.borrow() {
                        return Err(StageError::Cancelled);
                    }
                    let bytes = &artifact.bytes()[start as usize..end as usize];
                    self.write_one(buffer, start, bytes, retries).await
                }
            })
            .buffer_unordered(self.concurrency)
            .try_collect::<Vec<()>>()
            .await?;

        Ok(total)
    }

    /// Write and confirm a single chunk, retrying transient failures with
    /// backoff. Retries are safe: a chunk write is idempotent for a fixed
    /// offset.
    async fn write_one(
        &self,
        buffer: &AccountId,
        offset: u64,
        bytes: &[u8],
        retries: &AtomicU32,
    ) -> Result<(), StageError> {
        let signature = (|| async { self.gateway.write_chunk(buffer, offset, bytes).await })
            .retry(self.retry.backoff())
            .when(GatewayError::is_transient)
            .notify(|err, delay| {
                retries.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(offset, error = %err, delay = ?delay, "Chunk write failed, retrying...");
            })
            .await
            .map_err(|source| StageError::Chunk {
                offset,
                attempts: self.retry.max_retries + 1,
                source,
            })?;

        (|| async { self.gateway.confirm(&signature).await })
            .retry(self.retry.backoff())
            .when(GatewayError::is_transient)
            .notify(|err, delay| {
                retries.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(offset, error = %err, delay = ?delay, "Confirmation failed, retrying...");
            })
            .await
            .map_err(|source| StageError::Confirm { offset, source })?;

        tracing::debug!(offset, len = bytes.len(), "Chunk confirmed");
        Ok(())
    }

    /// Best-effort close. A leaked buffer is a recoverable operational cost,
    /// not a correctness failure, so errors are logged and swallowed.
    pub async fn discard(&self, buffer: &AccountId) {
        match self.gateway.close_account(buffer).await {
            Ok(()) => tracing::info!(buffer = %buffer, "Buffer account closed"),
            Err(err) => {
                tracing::warn!(buffer = %buffer, error = %err, "Failed to close buffer account")
            }
        }
    }
}

/// Split `len` bytes into disjoint `(start, end)` ranges of at most
/// `chunk_size` bytes, covering the whole length in order.
fn chunk_ranges(len: u64, chunk_size: usize) -> Vec<(u64, u64)> {
    let chunk = chunk_size as u64;
    let mut ranges = Vec::with_capacity(len.div_ceil(chunk.max(1)) as usize);
    let mut start = 0;
    while start < len {
        let end = (start + chunk).min(len);
        ranges.push((start, end));
        start = end;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ranges_exact_multiple() {
        let ranges = chunk_ranges(1024, 256);
        assert_eq!(ranges, vec![(0, 256), (256, 512), (512, 768), (768, 1024)]);
    }

    #[test]
    fn test_chunk_ranges_with_remainder() {
        let ranges = chunk_ranges(1000, 256);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges.last(), Some(&(768, 1000)));
    }

    #[test]
    fn test_chunk_ranges_smaller_than_chunk() {
        assert_eq!(chunk_ranges(10, 256), vec![(0, 10)]);
    }

    #[test]
    fn test_chunk_ranges_empty() {
        assert!(chunk_ranges(0, 256).is_empty());
    }

    #[test]
    fn test_chunk_ranges_are_disjoint_and_cover() {
        let len = 12_345;
        let ranges = chunk_ranges(len, 900);

        let mut cursor = 0;
        for (start, end) in &ranges {
            assert_eq!(*start, cursor, "ranges must be contiguous");
            assert!(end > start);
            assert!(end - start <= 900);
            cursor = *end;
        }
        assert_eq!(cursor, len, "ranges must cover the whole length");
    }
}
