//! Admin endpoints for registering versions and issuing publish keys.
//!
//! All routes here sit behind `auth::require_admin`.

use crate::auth::hash_token;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use packyard_core::{ContentHash, PackageVersionKey, PackageVersionRecord};
use packyard_metadata::models::{PackageVersionRow, PublishKeyRow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Maximum JSON body size for admin requests.
const MAX_ADMIN_BODY_SIZE: usize = 64 * 1024;

/// Version registration request.
#[derive(Debug, Deserialize)]
pub struct RegisterVersionRequest {
    pub package_type: String,
    pub package_scope: String,
    pub package_name: String,
    pub version_number: String,
}

/// Publish key issuance request.
#[derive(Debug, Deserialize)]
pub struct CreatePublishKeyRequest {
    pub package_type: String,
    pub package_scope: String,
    pub package_name: String,
    pub version_number: String,
    /// SHA-256 hex of the archive the key may publish.
    pub declared_hash: String,
}

/// Publish key issuance response. The key is shown only once.
#[derive(Debug, Serialize)]
pub struct CreatePublishKeyResponse {
    pub key: String,
}

async fn read_json<T: DeserializeOwned>(req: Request) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_ADMIN_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

fn version_key(
    package_type: String,
    package_scope: String,
    package_name: String,
    version_number: String,
) -> ApiResult<PackageVersionKey> {
    PackageVersionKey::new(package_type, package_scope, package_name, version_number)
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// POST /api/v1/admin/versions - Register an unpublished version.
pub async fn register_version(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<PackageVersionRecord>)> {
    let body: RegisterVersionRequest = read_json(req).await?;
    let key = version_key(
        body.package_type,
        body.package_scope,
        body.package_name,
        body.version_number,
    )?;

    let row = PackageVersionRow::unpublished(&key, state.clock.now());
    state.metadata.create_package_version(&row).await?;
    tracing::info!(version = %key, "Package version registered");

    Ok((StatusCode::CREATED, Json(row.into())))
}

/// GET /api/v1/admin/versions/{type}/{scope}/{name}/{version} - Get a version.
pub async fn get_version(
    State(state): State<AppState>,
    Path((package_type, package_scope, package_name, version_number)): Path<(
        String,
        String,
        String,
        String,
    )>,
) -> ApiResult<Json<PackageVersionRecord>> {
    let key = version_key(package_type, package_scope, package_name, version_number)?;
    let row = state
        .metadata
        .get_package_version(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("version {key} not found")))?;
    Ok(Json(row.into()))
}

/// POST /api/v1/admin/publish-keys - Issue a single-use publish key.
pub async fn create_publish_key(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreatePublishKeyResponse>)> {
    let body: CreatePublishKeyRequest = read_json(req).await?;
    let declared_hash = ContentHash::from_hex(&body.declared_hash)
        .map_err(|e| ApiError::BadRequest(format!("invalid declared_hash: {e}")))?;
    let key = version_key(
        body.package_type,
        body.package_scope,
        body.package_name,
        body.version_number,
    )?;

    if state.metadata.get_package_version(&key).await?.is_none() {
        return Err(ApiError::NotFound(format!("version {key} not found")));
    }

    let secret = generate_publish_key();
    let row = PublishKeyRow {
        key_hash: hash_token(&secret),
        package_type: key.package_type.clone(),
        package_scope: key.package_scope.clone(),
        package_name: key.package_name.clone(),
        version_number: key.version_number.clone(),
        declared_hash: declared_hash.to_hex(),
        used_at: None,
        created_at: state.clock.now(),
    };
    state.metadata.create_publish_key(&row).await?;
    tracing::info!(version = %key, "Publish key issued");

    Ok((
        StatusCode::CREATED,
        Json(CreatePublishKeyResponse { key: secret }),
    ))
}

/// Generate a random publish key (256 bits, hex).
fn generate_publish_key() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
