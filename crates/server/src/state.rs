//! Application state shared across handlers.

use crate::bootstrap::admin_token_hash;
use crate::publish::{Clock, PublishPipeline, SystemClock};
use packyard_core::config::AppConfig;
use packyard_metadata::MetadataStore;
use packyard_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Time source for records written by handlers.
    pub clock: Arc<dyn Clock>,
    /// Publish pipeline built over the same stores.
    pub pipeline: Arc<PublishPipeline>,
    /// Normalized admin token digest.
    pub admin_token_hash: String,
}

impl AppState {
    /// Create application state with the system clock.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> anyhow::Result<Self> {
        Self::with_clock(config, storage, metadata, Arc::new(SystemClock))
    }

    /// Create application state with an explicit clock.
    ///
    /// Fails if the configuration is invalid.
    pub fn with_clock(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let admin_token_hash = admin_token_hash(&config.admin)?;

        let pipeline = Arc::new(PublishPipeline::new(
            metadata.clone(),
            storage.clone(),
            clock.clone(),
            config.upload.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            storage,
            metadata,
            clock,
            pipeline,
            admin_token_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packyard_metadata::SqliteStore;
    use packyard_storage::FilesystemBackend;
    use tempfile::tempdir;

    async fn stores(
        temp: &tempfile::TempDir,
    ) -> (Arc<dyn ObjectStore>, Arc<dyn MetadataStore>) {
        let storage: Arc<dyn ObjectStore> =
            Arc::new(FilesystemBackend::new(temp.path().join("blobs")).await.unwrap());
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(temp.path().join("metadata.db"), None)
                .await
                .unwrap(),
        );
        (storage, metadata)
    }

    #[tokio::test]
    async fn new_normalizes_admin_hash() {
        let temp = tempdir().unwrap();
        let (storage, metadata) = stores(&temp).await;

        let mut config = AppConfig::for_testing();
        let expected = config.admin.token_hash.clone();
        config.admin.token_hash = format!("sha256:{}", expected.to_uppercase());

        let state = AppState::new(config, storage, metadata).unwrap();
        assert_eq!(state.admin_token_hash, expected);
    }

    #[tokio::test]
    async fn new_rejects_invalid_upload_config() {
        let temp = tempdir().unwrap();
        let (storage, metadata) = stores(&temp).await;

        let mut config = AppConfig::for_testing();
        config.upload.max_part_size = 0;

        assert!(AppState::new(config, storage, metadata).is_err());
    }
}
