//! Object store wrappers that inject part failures and count calls.

use async_trait::async_trait;
use bytes::Bytes;
use packyard_storage::{
    CompletedPart, FinalizedObject, MultipartUpload, ObjectStore, PutOptions, StorageError,
    StorageResult,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::Barrier;

/// Counters shared between a [`FaultyStore`] and the uploads it starts.
#[derive(Debug, Default)]
pub struct UploadCounters {
    /// `write_part` failures still to inject.
    failures_left: AtomicU32,
    pub part_attempts: AtomicU64,
    pub begins: AtomicU64,
    pub finalizes: AtomicU64,
    pub aborts: AtomicU64,
}

#[allow(dead_code)]
impl UploadCounters {
    pub fn part_attempts(&self) -> u64 {
        self.part_attempts.load(Ordering::SeqCst)
    }

    pub fn begins(&self) -> u64 {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn finalizes(&self) -> u64 {
        self.finalizes.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> u64 {
        self.aborts.load(Ordering::SeqCst)
    }

    /// Wait up to one second for a spawned abort to land.
    pub async fn wait_for_abort(&self) -> bool {
        for _ in 0..100 {
            if self.aborts() > 0 {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        false
    }
}

/// Wraps a real store and fails the first `failures` part writes.
pub struct FaultyStore {
    inner: Arc<dyn ObjectStore>,
    counters: Arc<UploadCounters>,
    finalize_gate: Option<Arc<Barrier>>,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new(inner: Arc<dyn ObjectStore>, failures: u32) -> Self {
        let counters = UploadCounters::default();
        counters.failures_left.store(failures, Ordering::SeqCst);
        Self {
            inner,
            counters: Arc::new(counters),
            finalize_gate: None,
        }
    }

    /// Hold every finalize until `uploads` uploads are waiting to finalize.
    pub fn with_finalize_gate(mut self, uploads: usize) -> Self {
        self.finalize_gate = Some(Arc::new(Barrier::new(uploads)));
        self
    }

    /// A store whose part writes never succeed.
    pub fn always_failing(inner: Arc<dyn ObjectStore>) -> Self {
        Self::new(inner, u32::MAX)
    }

    /// A store that never fails.
    pub fn passthrough(inner: Arc<dyn ObjectStore>) -> Self {
        Self::new(inner, 0)
    }

    pub fn counters(&self) -> Arc<UploadCounters> {
        self.counters.clone()
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn begin_multipart(
        &self,
        key: &str,
        options: &PutOptions,
    ) -> StorageResult<Box<dyn MultipartUpload>> {
        self.counters.begins.fetch_add(1, Ordering::SeqCst);
        let upload = self.inner.begin_multipart(key, options).await?;
        Ok(Box::new(FaultyUpload {
            inner: upload,
            counters: self.counters.clone(),
            finalize_gate: self.finalize_gate.clone(),
        }))
    }

    fn object_url(&self, key: &str) -> String {
        self.inner.object_url(key)
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

struct FaultyUpload {
    inner: Box<dyn MultipartUpload>,
    counters: Arc<UploadCounters>,
    finalize_gate: Option<Arc<Barrier>>,
}

#[async_trait]
impl MultipartUpload for FaultyUpload {
    fn key(&self) -> &str {
        self.inner.key()
    }

    async fn write_part(&self, part_number: i32, data: Bytes) -> StorageResult<CompletedPart> {
        self.counters.part_attempts.fetch_add(1, Ordering::SeqCst);
        let inject = self
            .counters
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if inject {
            return Err(StorageError::Multipart(format!(
                "injected failure for part {part_number}"
            )));
        }
        self.inner.write_part(part_number, data).await
    }

    async fn finalize(
        self: Box<Self>,
        parts: Vec<CompletedPart>,
    ) -> StorageResult<FinalizedObject> {
        self.counters.finalizes.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.finalize_gate {
            gate.wait().await;
        }
        self.inner.finalize(parts).await
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.counters.aborts.fetch_add(1, Ordering::SeqCst);
        self.inner.abort().await
    }
}
