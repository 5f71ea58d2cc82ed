//! Health check.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /api/v1/health - Health check.
///
/// Unauthenticated for load balancers and liveness checks. Reports `503` when the
/// metadata store or object store is unreachable.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let metadata = state.metadata.health_check().await;
    let storage = state.storage.health_check().await;

    match (metadata, storage) {
        (Ok(()), Ok(())) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                version: env!("CARGO_PKG_VERSION"),
            }),
        ),
        (metadata, storage) => {
            if let Err(e) = metadata {
                tracing::error!(error = %e, "Metadata health check failed");
            }
            if let Err(e) = storage {
                tracing::error!(error = %e, "Storage health check failed");
            }
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    version: env!("CARGO_PKG_VERSION"),
                }),
            )
        }
    }
}
