//! Publish endpoint.

use crate::error::PublishResponse;
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use packyard_core::ErrorKind;
use std::time::Instant;

/// POST /api/v1/publish - Publish a package archive.
///
/// The body is the raw archive; the bearer key names the version and the
/// archive's expected hash.
pub async fn publish(State(state): State<AppState>, headers: HeaderMap, body: Body) -> Response {
    let started = Instant::now();
    metrics::PUBLISH_ATTEMPTS.inc();

    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let result = state
        .pipeline
        .publish(authorization, body.into_data_stream())
        .await;
    metrics::PUBLISH_DURATION.observe(started.elapsed().as_secs_f64());

    match result {
        Ok(_) => {
            metrics::PUBLISH_SUCCEEDED.inc();
            (StatusCode::OK, Json(PublishResponse::success())).into_response()
        }
        Err(err) => {
            metrics::record_publish_error(err.kind());
            match err.kind() {
                ErrorKind::UploadFailed | ErrorKind::UncaughtException => {
                    tracing::error!(kind = %err.kind(), error = %err.message(), "Publish failed");
                }
                _ => {
                    tracing::warn!(kind = %err.kind(), error = %err.message(), "Publish rejected");
                }
            }
            err.into_response()
        }
    }
}
