//! Object storage abstraction and backends for packyard.
//!
//! This crate provides:
//! - Multipart uploads that only become visible on finalize
//! - Object URLs recorded against published versions
//! - Backends: local filesystem and S3-compatible

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{CompletedPart, FinalizedObject, MultipartUpload, ObjectStore, PutOptions};

use packyard_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem {
            path,
            public_base_url,
        } => {
            let backend = FilesystemBackend::new(path)
                .await?
                .with_public_base_url(public_base_url.clone());
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
            public_base_url,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
                public_base_url.clone(),
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}
