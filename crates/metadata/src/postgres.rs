//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{PackageRepo, PublishKeyRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use packyard_core::PackageVersionKey;
use packyard_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// This allows credentials to be passed separately, enabling better
    /// secret management (e.g., passwords via environment variables).
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared statement,
        // so we split the schema and execute each statement separately.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PublishKeyRepo for PostgresStore {
    async fn create_publish_key(&self, key: &PublishKeyRow) -> MetadataResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO publish_keys (
                key_hash, package_type, package_scope, package_name,
                version_number, declared_hash, used_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
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
            sqlx::query_as::<_, PublishKeyRow>("SELECT * FROM publish_keys WHERE key_hash = $1")
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
            "UPDATE publish_keys SET used_at = $1 WHERE key_hash = $2 AND used_at IS NULL",
        )
        .bind(used_at)
        .bind(key_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PackageRepo for PostgresStore {
    async fn create_package_version(&self, version: &PackageVersionRow) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO packages (
                package_type, package_scope, package_name,
                last_published_version, created_at, updated_at
            ) VALUES ($1, $2, $3, NULL, $4, $4)
            ON CONFLICT (package_type, package_scope, package_name) DO NOTHING
            "#,
        )
        .bind(&version.package_type)
        .bind(&version.package_scope)
        .bind(&version.package_name)
        .bind(version.created_at)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO package_versions (
                package_type, package_scope, package_name, version_number,
                published, package_hash, package_url, published_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
            WHERE package_type = $1 AND package_scope = $2 AND package_name = $3
              AND version_number = $4
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
            WHERE package_type = $1 AND package_scope = $2 AND package_name = $3
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
            SET published = TRUE, package_hash = $1, package_url = $2, published_at = $3
            WHERE package_type = $4 AND package_scope = $5 AND package_name = $6
              AND version_number = $7 AND published = FALSE
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
            UPDATE packages SET last_published_version = $1, updated_at = $2
            WHERE package_type = $3 AND package_scope = $4 AND package_name = $5
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
