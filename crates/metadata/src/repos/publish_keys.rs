//! Publish key repository.

use crate::error::MetadataResult;
use crate::models::PublishKeyRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for single-use publish keys.
#[async_trait]
pub trait PublishKeyRepo: Send + Sync {
    /// Create a publish key.
    async fn create_publish_key(&self, key: &PublishKeyRow) -> MetadataResult<()>;

    /// Get a publish key by the digest of its bearer value.
    async fn get_publish_key(&self, key_hash: &str) -> MetadataResult<Option<PublishKeyRow>>;

    /// Stamp `used_at` if and only if the key is still unused.
    ///
    /// Returns `true` when this call spent the key, `false` when it was
    /// already spent (or does not exist).
    async fn mark_publish_key_used(
        &self,
        key_hash: &str,
        used_at: OffsetDateTime,
    ) -> MetadataResult<bool>;
}
