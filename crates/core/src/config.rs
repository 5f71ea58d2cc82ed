//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, ensure this endpoint is network-restricted
    /// to authorized Prometheus scraper IPs only at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:4000".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Admin token configuration.
///
/// The admin token guards version registration and publish key issuance.
/// Only its SHA-256 digest is configured; the raw token never touches disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Pre-computed hash of the admin token (SHA256 hex, 64 characters).
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    pub token_hash: String,
}

impl AdminConfig {
    /// Create a test configuration with a dummy token hash.
    ///
    /// **For testing only.** The hash is deterministic but not a real token.
    pub fn for_testing() -> Self {
        Self {
            // SHA256 of "test-admin-token"
            token_hash: "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
                .to_string(),
        }
    }
}

/// Publish upload configuration.
///
/// Controls how an incoming archive is split into multipart parts and the
/// object options attached to the stored blob.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum size of a single multipart part in bytes (default: 20 MiB).
    #[serde(default = "default_max_part_size")]
    pub max_part_size: usize,
    /// Number of parts uploaded concurrently (default: 5).
    #[serde(default = "default_concurrent_parts")]
    pub concurrent_parts: usize,
    /// Retries per part after the first attempt (default: 3).
    #[serde(default = "default_part_retries")]
    pub part_retries: u32,
    /// Base delay for exponential part retry backoff in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Largest archive accepted in bytes (default: 1 GiB).
    #[serde(default = "default_max_archive_size")]
    pub max_archive_size: u64,
    /// Top-level blob path segment for archives (default: "packs").
    #[serde(default = "default_category")]
    pub category: String,
    /// Content type stored with the blob.
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Canned ACL applied to the blob (S3 only).
    #[serde(default = "default_acl")]
    pub acl: Option<String>,
    /// Server-side encryption algorithm (S3 only).
    #[serde(default = "default_server_side_encryption")]
    pub server_side_encryption: Option<String>,
}

fn default_max_part_size() -> usize {
    crate::DEFAULT_PART_SIZE
}

fn default_concurrent_parts() -> usize {
    crate::DEFAULT_CONCURRENT_PARTS
}

fn default_part_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

fn default_max_archive_size() -> u64 {
    1024 * 1024 * 1024
}

fn default_category() -> String {
    crate::package::DEFAULT_CATEGORY.to_string()
}

fn default_content_type() -> String {
    "application/x-compressed".to_string()
}

fn default_acl() -> Option<String> {
    Some("public-read".to_string())
}

fn default_server_side_encryption() -> Option<String> {
    Some("AES256".to_string())
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_part_size: default_max_part_size(),
            concurrent_parts: default_concurrent_parts(),
            part_retries: default_part_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_archive_size: default_max_archive_size(),
            category: default_category(),
            content_type: default_content_type(),
            acl: default_acl(),
            server_side_encryption: default_server_side_encryption(),
        }
    }
}

impl UploadConfig {
    /// Validate upload configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_part_size == 0 {
            return Err("upload.max_part_size must be greater than zero".to_string());
        }
        if self.concurrent_parts == 0 {
            return Err("upload.concurrent_parts must be greater than zero".to_string());
        }
        if self.max_archive_size == 0 {
            return Err("upload.max_archive_size must be greater than zero".to_string());
        }
        if self.max_part_size as u64 > self.max_archive_size {
            return Err(format!(
                "upload.max_part_size ({}) exceeds upload.max_archive_size ({})",
                self.max_part_size, self.max_archive_size
            ));
        }
        if self.category.is_empty() || self.category.contains(['/', '\\']) {
            return Err("upload.category must be a single non-empty path segment".to_string());
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
        /// Base URL the root directory is served from. Falls back to `file://` URLs.
        #[serde(default)]
        public_base_url: Option<String>,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to AWS_ACCESS_KEY_ID env var if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to AWS_SECRET_ACCESS_KEY env var if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        secret_access_key: Option<String>,
        /// Force path-style URLs (e.g., `endpoint/bucket/key` instead of `bucket.endpoint/key`).
        /// Required for MinIO and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
        /// Base URL recorded for published archives when the service
        /// does not report a location (e.g., a CDN in front of the bucket).
        #[serde(default)]
        public_base_url: Option<String>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
            public_base_url: None,
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.is_empty() {
                    return Err("s3 config requires a non-empty bucket".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            StorageConfig::Filesystem { .. } => Ok(()),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (recommended for testing and small deployments only).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only - SQLite cannot force-cancel queries).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL (optional if using individual fields).
        /// Takes precedence over individual fields if both are provided.
        url: Option<String>,
        /// Database host (e.g., "localhost" or "db.example.com").
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer PACKYARD_METADATA__PASSWORD env var over storing in config.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds (prevents hung queries).
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600) // 10 minutes (advisory only)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => {
                    Err("postgres config requires either 'url' or 'host' + 'database'".to_string())
                }
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// Root application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Publish upload configuration.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Admin token configuration (required).
    pub admin: AdminConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata,
    /// and a dummy admin token.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            upload: UploadConfig::default(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            admin: AdminConfig::for_testing(),
        }
    }

    /// Validate every section, returning the first violation.
    pub fn validate(&self) -> crate::Result<()> {
        self.upload
            .validate()
            .and_then(|()| self.storage.validate())
            .and_then(|()| self.metadata.validate())
            .map_err(crate::Error::InvalidConfig)
    }
}
