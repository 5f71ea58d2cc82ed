//! Package and package version repository.

use crate::error::MetadataResult;
use crate::models::{PackageRow, PackageVersionRow};
use async_trait::async_trait;
use packyard_core::PackageVersionKey;
use time::OffsetDateTime;

/// Repository for packages and their versions.
#[async_trait]
pub trait PackageRepo: Send + Sync {
    /// Register a version, creating its package record if needed.
    ///
    /// Fails with `AlreadyExists` if the version is already registered.
    async fn create_package_version(&self, version: &PackageVersionRow) -> MetadataResult<()>;

    /// Get a version by its composite key.
    async fn get_package_version(
        &self,
        key: &PackageVersionKey,
    ) -> MetadataResult<Option<PackageVersionRow>>;

    /// Get a package by `(type, scope, name)`.
    async fn get_package(
        &self,
        package_type: &str,
        package_scope: &str,
        package_name: &str,
    ) -> MetadataResult<Option<PackageRow>>;

    /// Transition a version from unpublished to published.
    ///
    /// The update only applies while `published` is still false. On success
    /// the package's `last_published_version` is updated in the same
    /// transaction. Returns `false` when the version was already published
    /// (or does not exist).
    async fn commit_published_version(
        &self,
        key: &PackageVersionKey,
        package_hash: &str,
        package_url: &str,
        published_at: OffsetDateTime,
    ) -> MetadataResult<bool>;
}
