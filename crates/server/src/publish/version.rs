//! At-most-once version publishing.

use crate::error::PublishError;
use packyard_core::{PackageVersionKey, PackageVersionRecord, VersionState};
use packyard_metadata::MetadataStore;
use std::sync::Arc;
use time::OffsetDateTime;

/// Guards the `Unpublished -> Published` transition of a version.
#[derive(Clone)]
pub struct VersionStateMachine {
    metadata: Arc<dyn MetadataStore>,
}

impl VersionStateMachine {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Load the version record and require it to be unpublished.
    ///
    /// A key for an unregistered version is an issuance fault, reported as
    /// `UncaughtException`.
    pub async fn check_publishable(
        &self,
        key: &PackageVersionKey,
    ) -> Result<PackageVersionRecord, PublishError> {
        let record: PackageVersionRecord = self
            .metadata
            .get_package_version(key)
            .await?
            .ok_or_else(|| PublishError::uncaught(format!("version {key} is not registered")))?
            .into();

        match record.state() {
            VersionState::Unpublished => Ok(record),
            VersionState::Published => Err(PublishError::already_published(format!(
                "version {key} is already published"
            ))),
        }
    }

    /// Record the version as published.
    ///
    /// The update is conditional on the version still being unpublished; a
    /// concurrent winner turns this into `AlreadyPublished`.
    pub async fn commit_publish(
        &self,
        key: &PackageVersionKey,
        package_hash: &str,
        package_url: &str,
        published_at: OffsetDateTime,
    ) -> Result<(), PublishError> {
        let committed = self
            .metadata
            .commit_published_version(key, package_hash, package_url, published_at)
            .await?;
        if !committed {
            return Err(PublishError::already_published(format!(
                "version {key} was published concurrently"
            )));
        }
        Ok(())
    }
}
