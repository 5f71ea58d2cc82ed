//! Database models mapping to the metadata schema.

use packyard_core::{
    ContentHash, PackageVersionKey, PackageVersionRecord, PublishCredential,
};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::error::{MetadataError, MetadataResult};

// =============================================================================
// Publish keys
// =============================================================================

/// Single-use publish key record.
///
/// `key_hash` is the SHA-256 hex digest of the bearer key handed to the client.
#[derive(Debug, Clone, FromRow)]
pub struct PublishKeyRow {
    pub key_hash: String,
    pub package_type: String,
    pub package_scope: String,
    pub package_name: String,
    pub version_number: String,
    pub declared_hash: String,
    pub used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl PublishKeyRow {
    pub fn version_key(&self) -> PackageVersionKey {
        PackageVersionKey {
            package_type: self.package_type.clone(),
            package_scope: self.package_scope.clone(),
            package_name: self.package_name.clone(),
            version_number: self.version_number.clone(),
        }
    }
}

impl TryFrom<PublishKeyRow> for PublishCredential {
    type Error = MetadataError;

    fn try_from(row: PublishKeyRow) -> MetadataResult<Self> {
        let declared_hash = ContentHash::from_hex(&row.declared_hash).map_err(|e| {
            MetadataError::Internal(format!("stored declared_hash is invalid: {e}"))
        })?;
        Ok(Self {
            version: row.version_key(),
            key_hash: row.key_hash,
            declared_hash,
            used_at: row.used_at,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Packages
// =============================================================================

/// Package record, one per `(type, scope, name)`.
#[derive(Debug, Clone, FromRow)]
pub struct PackageRow {
    pub package_type: String,
    pub package_scope: String,
    pub package_name: String,
    pub last_published_version: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Package version record.
#[derive(Debug, Clone, FromRow)]
pub struct PackageVersionRow {
    pub package_type: String,
    pub package_scope: String,
    pub package_name: String,
    pub version_number: String,
    pub published: bool,
    pub package_hash: Option<String>,
    pub package_url: Option<String>,
    pub published_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl PackageVersionRow {
    /// Build an unpublished row for a newly registered version.
    pub fn unpublished(key: &PackageVersionKey, created_at: OffsetDateTime) -> Self {
        Self {
            package_type: key.package_type.clone(),
            package_scope: key.package_scope.clone(),
            package_name: key.package_name.clone(),
            version_number: key.version_number.clone(),
            published: false,
            package_hash: None,
            package_url: None,
            published_at: None,
            created_at,
        }
    }
}

impl From<PackageVersionRow> for PackageVersionRecord {
    fn from(row: PackageVersionRow) -> Self {
        Self {
            key: PackageVersionKey {
                package_type: row.package_type,
                package_scope: row.package_scope,
                package_name: row.package_name,
                version_number: row.version_number,
            },
            published: row.published,
            package_hash: row.package_hash,
            package_url: row.package_url,
            published_at: row.published_at,
            created_at: row.created_at,
        }
    }
}
