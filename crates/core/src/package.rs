//! Package coordinates, publish credentials and the blob layout.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Maximum length of a single coordinate segment.
pub const MAX_SEGMENT_LEN: usize = 128;

/// Default blob category prefix for package archives.
pub const DEFAULT_CATEGORY: &str = "packs";

/// Archive file extension.
pub const ARCHIVE_EXTENSION: &str = "tgz";

/// Composite key identifying one version of one package.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageVersionKey {
    pub package_type: String,
    pub package_scope: String,
    pub package_name: String,
    pub version_number: String,
}

impl PackageVersionKey {
    /// Create a key, validating every segment.
    pub fn new(
        package_type: impl Into<String>,
        package_scope: impl Into<String>,
        package_name: impl Into<String>,
        version_number: impl Into<String>,
    ) -> crate::Result<Self> {
        let key = Self {
            package_type: package_type.into(),
            package_scope: package_scope.into(),
            package_name: package_name.into(),
            version_number: version_number.into(),
        };
        key.validate()?;
        Ok(key)
    }

    /// Validate that every segment is safe to embed in a storage key.
    pub fn validate(&self) -> crate::Result<()> {
        validate_segment("package_type", &self.package_type)?;
        validate_segment("package_scope", &self.package_scope)?;
        validate_segment("package_name", &self.package_name)?;
        validate_segment("version_number", &self.version_number)?;
        Ok(())
    }

    /// Archive file name: `<type>-<scope>-<name>-<version>.tgz`.
    pub fn archive_file_name(&self) -> String {
        format!(
            "{}-{}-{}-{}.{}",
            self.package_type,
            self.package_scope,
            self.package_name,
            self.version_number,
            ARCHIVE_EXTENSION
        )
    }

    /// Deterministic blob path under `category`.
    ///
    /// `<category>/<type>/<scope>/<name>/<version>/<type>-<scope>-<name>-<version>.tgz`
    pub fn blob_path(&self, category: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}",
            category,
            self.package_type,
            self.package_scope,
            self.package_name,
            self.version_number,
            self.archive_file_name()
        )
    }
}

impl fmt::Debug for PackageVersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackageVersionKey({self})")
    }
}

impl fmt::Display for PackageVersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}@{}",
            self.package_type, self.package_scope, self.package_name, self.version_number
        )
    }
}

fn validate_segment(field: &'static str, value: &str) -> crate::Result<()> {
    let invalid = |reason: &str| crate::Error::InvalidCoordinate {
        field,
        reason: reason.to_string(),
    };
    if value.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if value.len() > MAX_SEGMENT_LEN {
        return Err(invalid("too long"));
    }
    if value == "." || value.contains("..") {
        return Err(invalid("relative path segment"));
    }
    if value
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control() || c.is_whitespace())
    {
        return Err(invalid("contains a path separator, whitespace or control character"));
    }
    Ok(())
}

/// A single-use authorization to publish one package version.
#[derive(Clone, Debug)]
pub struct PublishCredential {
    /// SHA-256 hex digest of the bearer key; the raw key is never stored.
    pub key_hash: String,
    pub version: PackageVersionKey,
    /// Hash the uploaded archive must match.
    pub declared_hash: ContentHash,
    pub used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl PublishCredential {
    /// Whether the credential has already been spent.
    pub fn is_spent(&self) -> bool {
        self.used_at.is_some()
    }
}

/// Publish state of a package version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionState {
    Unpublished,
    Published,
}

impl VersionState {
    pub fn from_published(published: bool) -> Self {
        if published {
            Self::Published
        } else {
            Self::Unpublished
        }
    }
}

/// One version of one named package.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackageVersionRecord {
    #[serde(flatten)]
    pub key: PackageVersionKey,
    pub published: bool,
    pub package_hash: Option<String>,
    pub package_url: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PackageVersionRecord {
    pub fn state(&self) -> VersionState {
        VersionState::from_published(self.published)
    }
}

/// Failure kinds of a publish attempt.
///
/// The string codes are part of the HTTP contract and must not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    BadAuthorization,
    BadPackage,
    AlreadyPublished,
    PayloadTooLarge,
    MalformedPackage,
    UploadFailed,
    UncaughtException,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        Self::BadAuthorization,
        Self::BadPackage,
        Self::AlreadyPublished,
        Self::PayloadTooLarge,
        Self::MalformedPackage,
        Self::UploadFailed,
        Self::UncaughtException,
    ];

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadAuthorization => "BadAuthorization",
            Self::BadPackage => "BadPackage",
            Self::AlreadyPublished => "AlreadyPublished",
            Self::PayloadTooLarge => "PayloadTooLarge",
            Self::MalformedPackage => "MalformedPackage",
            Self::UploadFailed => "UploadFailed",
            Self::UncaughtException => "UncaughtException",
        }
    }

    /// Whether the failure was caused by the client request.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::UploadFailed | Self::UncaughtException)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
