//! Server test utilities.

use super::fixtures::FixedClock;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use http_body_util::BodyExt;
use packyard_core::config::{AdminConfig, AppConfig, MetadataConfig, StorageConfig, UploadConfig};
use packyard_core::PackageVersionKey;
use packyard_metadata::models::{PackageVersionRow, PublishKeyRow};
use packyard_metadata::{MetadataStore, SqliteStore};
use packyard_server::auth::hash_token;
use packyard_server::{AppState, Clock, create_router};
use packyard_storage::{FilesystemBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Raw admin token matching `AdminConfig::for_testing`.
#[allow(dead_code)]
pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

/// Fixed instant used for every timestamp the test server writes.
#[allow(dead_code)]
pub const TEST_NOW_UNIX: i64 = 1_760_000_000;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::build(|config| config, |storage| storage).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(
            |mut config| {
                modifier(&mut config);
                config
            },
            |storage| storage,
        )
        .await
    }

    /// Create a test server whose storage is wrapped by `wrap`.
    pub async fn with_storage<W, F>(wrap: W, modifier: F) -> Self
    where
        W: FnOnce(Arc<dyn ObjectStore>) -> Arc<dyn ObjectStore>,
        F: FnOnce(&mut AppConfig),
    {
        Self::build(
            |mut config| {
                modifier(&mut config);
                config
            },
            wrap,
        )
        .await
    }

    async fn build<C, W>(configure: C, wrap: W) -> Self
    where
        C: FnOnce(AppConfig) -> AppConfig,
        W: FnOnce(Arc<dyn ObjectStore>) -> Arc<dyn ObjectStore>,
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        std::fs::create_dir_all(&storage_path).expect("Failed to create storage directory");
        let filesystem: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );
        let storage = wrap(filesystem);

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        // Fast retries keep failure tests quick
        let upload = UploadConfig {
            retry_base_delay_ms: 1,
            ..Default::default()
        };

        let config = configure(AppConfig {
            server: Default::default(),
            upload,
            storage: StorageConfig::Filesystem {
                path: storage_path,
                public_base_url: None,
            },
            metadata: MetadataConfig::Sqlite {
                path: db_path,
                query_timeout_secs: None,
            },
            admin: AdminConfig::for_testing(),
        });

        let state = AppState::with_clock(
            config,
            storage,
            metadata,
            Arc::new(FixedClock::at_unix(TEST_NOW_UNIX)),
        )
        .expect("Failed to create app state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Get access to the underlying storage.
    pub fn storage(&self) -> Arc<dyn ObjectStore> {
        self.state.storage.clone()
    }

    /// Directory the filesystem storage backend writes under.
    pub fn storage_root(&self) -> std::path::PathBuf {
        self._temp_dir.path().join("storage")
    }

    /// Blob path an archive for `version` is stored under.
    pub fn blob_path(&self, version: &PackageVersionKey) -> String {
        version.blob_path(&self.state.config.upload.category)
    }

    /// Register `version` as unpublished directly in the metadata store.
    pub async fn register_version(&self, version: &PackageVersionKey) {
        let row = PackageVersionRow::unpublished(version, self.state.clock.now());
        self.metadata()
            .create_package_version(&row)
            .await
            .expect("Failed to register version");
    }

    /// Issue a publish key for `version` and return its bearer value.
    pub async fn issue_key(&self, version: &PackageVersionKey, declared_hash: &str) -> String {
        let secret = format!("key-{}", uuid::Uuid::new_v4().simple());
        let row = PublishKeyRow {
            key_hash: hash_token(&secret),
            package_type: version.package_type.clone(),
            package_scope: version.package_scope.clone(),
            package_name: version.package_name.clone(),
            version_number: version.version_number.clone(),
            declared_hash: declared_hash.to_string(),
            used_at: None,
            created_at: self.state.clock.now(),
        };
        self.metadata()
            .create_publish_key(&row)
            .await
            .expect("Failed to issue publish key");
        secret
    }

    /// Send a request through the router and collect the response body.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();
        (status, body)
    }

    /// Send a request and parse the response body as JSON.
    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, body) = self.send(request).await;
        let json = serde_json::from_slice(&body).unwrap_or_else(|e| {
            panic!(
                "response is not JSON ({e}): {}",
                String::from_utf8_lossy(&body)
            )
        });
        (status, json)
    }

    /// POST an archive to the publish endpoint.
    pub async fn publish(&self, key: Option<&str>, body: Bytes) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/publish")
            .header(header::CONTENT_TYPE, "application/octet-stream");
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        self.send_json(builder.body(Body::from(body)).unwrap()).await
    }

    /// Send a JSON request to an admin route with the given bearer token.
    pub async fn admin(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, Bytes) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }
}
