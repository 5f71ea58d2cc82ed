//! Publish orchestration.

use crate::error::PublishError;
use crate::publish::clock::Clock;
use crate::publish::coordinator::UploadCoordinator;
use crate::publish::decoder::PackageDecoder;
use crate::publish::validator::PublishKeyValidator;
use crate::publish::version::VersionStateMachine;
use bytes::Bytes;
use futures::Stream;
use packyard_core::PackageVersionKey;
use packyard_core::config::UploadConfig;
use packyard_metadata::MetadataStore;
use packyard_storage::ObjectStore;
use std::fmt::Display;
use std::sync::Arc;

/// A successfully published version.
#[derive(Clone, Debug)]
pub struct PublishOutcome {
    pub version: PackageVersionKey,
    pub package_hash: String,
    pub package_url: String,
    pub size: u64,
}

/// Runs a publish request from credential to committed version.
///
/// Steps, each short-circuiting on failure:
/// 1. resolve the bearer key
/// 2. spend it
/// 3. require the version to be unpublished before touching storage
/// 4. stream the body into a multipart upload while hashing it
/// 5. compare the hash with the key's declared hash
/// 6. require the version to still be unpublished
/// 7. finalize the upload
/// 8. commit the version as published
///
/// The upload is aborted on any failure before step 7. The key stays spent
/// once step 2 succeeds.
pub struct PublishPipeline {
    validator: PublishKeyValidator,
    versions: VersionStateMachine,
    coordinator: UploadCoordinator,
    clock: Arc<dyn Clock>,
    upload: UploadConfig,
}

impl PublishPipeline {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
        upload: UploadConfig,
    ) -> Self {
        Self {
            validator: PublishKeyValidator::new(metadata.clone()),
            versions: VersionStateMachine::new(metadata),
            coordinator: UploadCoordinator::new(storage, &upload),
            clock,
            upload,
        }
    }

    /// Publish the archive in `body` under the key in `authorization`.
    pub async fn publish<S, E>(
        &self,
        authorization: Option<&str>,
        body: S,
    ) -> Result<PublishOutcome, PublishError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let credential = self.validator.resolve(authorization).await?;
        credential.version.validate()?;
        self.validator
            .mark_used(&credential, self.clock.now())
            .await?;

        let version = &credential.version;
        self.versions.check_publishable(version).await?;

        let blob_path = version.blob_path(&self.upload.category);
        let mut decoder = PackageDecoder::new(
            body,
            self.upload.max_part_size,
            self.upload.max_archive_size,
        );

        let mut pending = self.coordinator.begin(&blob_path).await?;
        if let Err(e) = pending.transfer(&mut decoder).await {
            pending.abort().await;
            return Err(e);
        }
        let decoded = match decoder.into_decoded() {
            Ok(decoded) => decoded,
            Err(e) => {
                pending.abort().await;
                return Err(e);
            }
        };

        if decoded.content_hash != credential.declared_hash {
            pending.abort().await;
            return Err(PublishError::bad_package(format!(
                "hash mismatch for {version}: declared {}, got {}",
                credential.declared_hash, decoded.content_hash
            )));
        }

        // Another publish may have committed while this body was streaming
        if let Err(e) = self.versions.check_publishable(version).await {
            pending.abort().await;
            return Err(e);
        }

        let uploaded = pending.finalize().await?;
        let package_hash = decoded.content_hash.to_hex();

        if let Err(e) = self
            .versions
            .commit_publish(version, &package_hash, &uploaded.blob_url, self.clock.now())
            .await
        {
            tracing::warn!(
                version = %version,
                key = %blob_path,
                "Version commit failed after finalize, stored archive is orphaned"
            );
            return Err(e);
        }

        tracing::info!(
            version = %version,
            size = decoded.size,
            url = %uploaded.blob_url,
            "Package version published"
        );

        Ok(PublishOutcome {
            version: credential.version.clone(),
            package_hash,
            package_url: uploaded.blob_url,
            size: decoded.size,
        })
    }
}
