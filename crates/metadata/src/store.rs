//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{PackageRepo, PublishKeyRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: PublishKeyRepo + PackageRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(600);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // A single connection serializes writers, so concurrent conditional
            // updates never race inside SQLite itself.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::warn!(
            query_timeout_secs = query_timeout_secs,
            "SQLite query timeout is advisory only. Use PostgreSQL for production deployments."
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use packyard_core::PackageVersionKey;
    use time::OffsetDateTime;

    #[async_trait]
    impl PublishKeyRepo for SqliteStore {
        async fn create_publish_key(&self, key: &PublishKeyRow) -> MetadataResult<()> {
            let result = sqlx::query(
                r#"
                INSERT INTO publish_keys (
                    key_hash, package_type, package_scope, package_name,
                    version_number, declared_hash, used_at, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (key_hash) DO NOTHING
                "#,
            )
            .bind(&key.key_hash)
            .bind(&key.package_type)
            .bind(&key.package_scope)
            .bind(&key.package_name)
            .bind(&key.version_number)
            .bind(&key.declared_hash)
            .bind(key.used_at)
            .bind(key.created_at)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::AlreadyExists(
                    "publish key already exists".to_string(),
                ));
            }
            Ok(())
        }

        async fn get_publish_key(&self, key_hash: &str) -> MetadataResult<Option<PublishKeyRow>> {
            let row =
                sqlx::query_as::<_, PublishKeyRow>("SELECT * FROM publish_keys WHERE key_hash = ?")
                    .bind(key_hash)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn mark_publish_key_used(
            &self,
            key_hash: &str,
            used_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE publish_keys SET used_at = ? WHERE key_hash = ? AND used_at IS NULL",
            )
            .bind(used_at)
            .bind(key_hash)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }
    }

    #[async_trait]
    impl PackageRepo for SqliteStore {
        async fn create_package_version(&self, version: &PackageVersionRow) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO packages (
                    package_type, package_scope, package_name,
                    last_published_version, created_at, updated_at
                ) VALUES (?, ?, ?, NULL, ?, ?)
                ON CONFLICT (package_type, package_scope, package_name) DO NOTHING
                "#,
            )
            .bind(&version.package_type)
            .bind(&version.package_scope)
            .bind(&version.package_name)
            .bind(version.created_at)
            .bind(version.created_at)
            .execute(&mut *tx)
            .await?;

            let result = sqlx::query(
                r#"
                INSERT INTO package_versions (
                    package_type, package_scope, package_name, version_number,
                    published, package_hash, package_url, published_at, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (package_type, package_scope, package_name, version_number) DO NOTHING
                "#,
            )
            .bind(&version.package_type)
            .bind(&version.package_scope)
            .bind(&version.package_name)
            .bind(&version.version_number)
            .bind(version.published)
            .bind(&version.package_hash)
            .bind(&version.package_url)
            .bind(version.published_at)
            .bind(version.created_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(MetadataError::AlreadyExists(format!(
                    "package version {}/{}/{}@{} already exists",
                    version.package_type,
                    version.package_scope,
                    version.package_name,
                    version.version_number
                )));
            }

            tx.commit().await?;
            Ok(())
        }

        async fn get_package_version(
            &self,
            key: &PackageVersionKey,
        ) -> MetadataResult<Option<PackageVersionRow>> {
            let row = sqlx::query_as::<_, PackageVersionRow>(
                r#"
                SELECT * FROM package_versions
                WHERE package_type = ? AND package_scope = ? AND package_name = ?
                  AND version_number = ?
                "#,
            )
            .bind(&key.package_type)
            .bind(&key.package_scope)
            .bind(&key.package_name)
            .bind(&key.version_number)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_package(
            &self,
            package_type: &str,
            package_scope: &str,
            package_name: &str,
        ) -> MetadataResult<Option<PackageRow>> {
            let row = sqlx::query_as::<_, PackageRow>(
                r#"
                SELECT * FROM packages
                WHERE package_type = ? AND package_scope = ? AND package_name = ?
                "#,
            )
            .bind(package_type)
            .bind(package_scope)
            .bind(package_name)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn commit_published_version(
            &self,
            key: &PackageVersionKey,
            package_hash: &str,
            package_url: &str,
            published_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let mut tx = self.pool.begin().await?;

            let result = sqlx::query(
                r#"
                UPDATE package_versions
                SET published = 1, package_hash = ?, package_url = ?, published_at = ?
                WHERE package_type = ? AND package_scope = ? AND package_name = ?
                  AND version_number = ? AND published = 0
                "#,
            )
            .bind(package_hash)
            .bind(package_url)
            .bind(published_at)
            .bind(&key.package_type)
            .bind(&key.package_scope)
            .bind(&key.package_name)
            .bind(&key.version_number)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(false);
            }

            sqlx::query(
                r#"
                UPDATE packages SET last_published_version = ?, updated_at = ?
                WHERE package_type = ? AND package_scope = ? AND package_name = ?
                "#,
            )
            .bind(&key.version_number)
            .bind(published_at)
            .bind(&key.package_type)
            .bind(&key.package_scope)
            .bind(&key.package_name)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(true)
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Packages
CREATE TABLE IF NOT EXISTS packages (
    package_type TEXT NOT NULL,
    package_scope TEXT NOT NULL,
    package_name TEXT NOT NULL,
    last_published_version TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (package_type, package_scope, package_name)
);

-- Package versions
CREATE TABLE IF NOT EXISTS package_versions (
    package_type TEXT NOT NULL,
    package_scope TEXT NOT NULL,
    package_name TEXT NOT NULL,
    version_number TEXT NOT NULL,
    published INTEGER NOT NULL DEFAULT 0,
    package_hash TEXT,
    package_url TEXT,
    published_at TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (package_type, package_scope, package_name, version_number),
    FOREIGN KEY (package_type, package_scope, package_name)
        REFERENCES packages(package_type, package_scope, package_name)
);

-- Single-use publish keys
CREATE TABLE IF NOT EXISTS publish_keys (
    key_hash TEXT PRIMARY KEY,
    package_type TEXT NOT NULL,
    package_scope TEXT NOT NULL,
    package_name TEXT NOT NULL,
    version_number TEXT NOT NULL,
    declared_hash TEXT NOT NULL,
    used_at TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (package_type, package_scope, package_name, version_number)
        REFERENCES package_versions(package_type, package_scope, package_name, version_number)
);
CREATE INDEX IF NOT EXISTS idx_publish_keys_version
    ON publish_keys(package_type, package_scope, package_name, version_number);
"#;
