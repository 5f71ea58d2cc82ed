//! Multipart upload coordination.
//!
//! Parts are pulled from the decoder and written with bounded concurrency.
//! Finalization is a separate step so the caller can verify the archive
//! before the object becomes addressable.

use crate::error::PublishError;
use crate::metrics;
use crate::publish::decoder::PackageDecoder;
use bytes::Bytes;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use packyard_core::config::UploadConfig;
use packyard_storage::{CompletedPart, MultipartUpload, ObjectStore, PutOptions, StorageResult};
use percent_encoding::percent_decode_str;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

/// A finalized archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadResult {
    /// Percent-decoded object URL.
    pub blob_url: String,
    pub bytes_written: u64,
}

#[derive(Clone, Copy, Debug)]
struct RetryPolicy {
    retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before retry `attempt` (1-based): base, 2x base, 4x base, ...
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Streams archives into the object store.
#[derive(Clone)]
pub struct UploadCoordinator {
    storage: Arc<dyn ObjectStore>,
    options: PutOptions,
    concurrent_parts: usize,
    retry: RetryPolicy,
}

impl UploadCoordinator {
    pub fn new(storage: Arc<dyn ObjectStore>, config: &UploadConfig) -> Self {
        Self {
            storage,
            options: PutOptions {
                content_type: Some(config.content_type.clone()),
                acl: config.acl.clone(),
                server_side_encryption: config.server_side_encryption.clone(),
            },
            concurrent_parts: config.concurrent_parts.max(1),
            retry: RetryPolicy {
                retries: config.part_retries,
                base_delay: Duration::from_millis(config.retry_base_delay_ms),
            },
        }
    }

    /// Start a multipart upload at `blob_path`.
    pub async fn begin(&self, blob_path: &str) -> Result<PendingUpload, PublishError> {
        let upload = self
            .storage
            .begin_multipart(blob_path, &self.options)
            .await
            .map_err(|e| PublishError::upload_failed(format!("failed to start upload: {e}")))?;

        tracing::debug!(
            key = %blob_path,
            backend = self.storage.backend_name(),
            "Multipart upload started"
        );

        Ok(PendingUpload {
            guard: MultipartGuard::new(upload),
            parts: Vec::new(),
            bytes_written: 0,
            concurrent_parts: self.concurrent_parts,
            retry: self.retry,
        })
    }
}

/// An in-progress multipart upload.
///
/// Dropping it before `finalize` aborts the upload in the background.
pub struct PendingUpload {
    guard: MultipartGuard,
    parts: Vec<CompletedPart>,
    bytes_written: u64,
    concurrent_parts: usize,
    retry: RetryPolicy,
}

impl PendingUpload {
    /// Object key being written.
    pub fn key(&self) -> &str {
        self.guard.upload.as_deref().map(|u| u.key()).unwrap_or("")
    }

    /// Drain the decoder into parts, keeping at most `concurrent_parts` in flight.
    pub async fn transfer<S, E>(
        &mut self,
        decoder: &mut PackageDecoder<S>,
    ) -> Result<u64, PublishError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let upload = self
            .guard
            .upload
            .as_deref()
            .ok_or_else(|| PublishError::uncaught("upload already closed"))?;
        let retry = self.retry;

        let mut in_flight = FuturesUnordered::new();
        let mut parts = Vec::new();
        let mut part_number: i32 = 0;
        let mut body_done = false;

        // Part writes keep running while the next part is still being read
        loop {
            let window_full = in_flight.len() >= self.concurrent_parts;
            tokio::select! {
                biased;
                Some(result) = in_flight.next(), if !in_flight.is_empty() => {
                    parts.push(result?);
                }
                next = decoder.next_part(), if !body_done && !window_full => match next? {
                    Some(data) => {
                        part_number += 1;
                        in_flight.push(write_part_with_retry(upload, part_number, data, retry));
                    }
                    None => body_done = true,
                },
                else => break,
            }
        }
        drop(in_flight);

        let written: u64 = parts.iter().map(|p: &CompletedPart| p.size).sum();
        self.parts.extend(parts);
        self.bytes_written += written;
        Ok(written)
    }

    /// Complete the upload, making the object addressable.
    pub async fn finalize(mut self) -> Result<UploadResult, PublishError> {
        let upload = self
            .guard
            .take()
            .ok_or_else(|| PublishError::uncaught("upload already closed"))?;
        let key = upload.key().to_string();
        let parts = std::mem::take(&mut self.parts);

        let object = match upload.finalize(parts).await {
            Ok(object) => object,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to finalize multipart upload");
                return Err(PublishError::upload_failed(format!(
                    "failed to finalize upload: {e}"
                )));
            }
        };

        metrics::BYTES_UPLOADED.inc_by(self.bytes_written);
        let blob_url = percent_decode_str(&object.url)
            .decode_utf8_lossy()
            .into_owned();

        tracing::debug!(key = %key, url = %blob_url, size = object.size, "Multipart upload finalized");

        Ok(UploadResult {
            blob_url,
            bytes_written: self.bytes_written,
        })
    }

    /// Abort the upload and wait for cleanup.
    pub async fn abort(mut self) {
        if let Some(upload) = self.guard.take() {
            let key = upload.key().to_string();
            metrics::UPLOADS_ABORTED.inc();
            match upload.abort().await {
                Ok(()) => tracing::info!(key = %key, "Aborted multipart upload"),
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Failed to abort multipart upload")
                }
            }
        }
    }
}

async fn write_part_with_retry(
    upload: &dyn MultipartUpload,
    part_number: i32,
    data: Bytes,
    retry: RetryPolicy,
) -> Result<CompletedPart, PublishError> {
    let mut attempt = 0;
    loop {
        let result: StorageResult<CompletedPart> = upload.write_part(part_number, data.clone()).await;
        match result {
            Ok(part) => {
                metrics::PARTS_UPLOADED.inc();
                return Ok(part);
            }
            Err(e) => {
                attempt += 1;
                if attempt > retry.retries {
                    tracing::error!(
                        key = %upload.key(),
                        part_number,
                        attempts = attempt,
                        error = %e,
                        "Part upload failed"
                    );
                    return Err(PublishError::upload_failed(format!(
                        "part {part_number} failed after {attempt} attempts: {e}"
                    )));
                }
                let delay = retry.delay(attempt);
                metrics::PART_RETRIES.inc();
                tracing::warn!(
                    key = %upload.key(),
                    part_number,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Part upload failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Aborts the wrapped upload on drop unless it was taken.
///
/// Uses `Handle::try_current()` so dropping outside a runtime only logs.
struct MultipartGuard {
    upload: Option<Box<dyn MultipartUpload>>,
    runtime_handle: Option<tokio::runtime::Handle>,
}

impl MultipartGuard {
    fn new(upload: Box<dyn MultipartUpload>) -> Self {
        Self {
            upload: Some(upload),
            runtime_handle: tokio::runtime::Handle::try_current().ok(),
        }
    }

    fn take(&mut self) -> Option<Box<dyn MultipartUpload>> {
        self.upload.take()
    }
}

impl Drop for MultipartGuard {
    fn drop(&mut self) {
        if let Some(upload) = self.upload.take() {
            let key = upload.key().to_string();
            if let Some(ref handle) = self.runtime_handle {
                metrics::UPLOADS_ABORTED.inc();
                handle.spawn(async move {
                    if let Err(e) = upload.abort().await {
                        tracing::error!(key = %key, error = %e, "Failed to abort orphaned multipart upload");
                    } else {
                        tracing::info!(key = %key, "Aborted orphaned multipart upload");
                    }
                });
            } else {
                tracing::warn!(
                    key = %key,
                    "MultipartGuard dropped without runtime handle - multipart upload may be orphaned"
                );
            }
        }
    }
}
