//! HTTP server for packyard package publishing.
//!
//! This crate provides:
//! - The publish pipeline (single-use keys, streaming hash, multipart upload)
//! - `POST /api/v1/publish` and the static site routes
//! - Admin endpoints for version registration and key issuance
//! - Health and Prometheus metrics endpoints

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod publish;
pub mod routes;
pub mod state;

pub use auth::TraceId;
pub use error::{ApiError, PublishError};
pub use publish::{Clock, PublishPipeline, SystemClock};
pub use routes::create_router;
pub use state::AppState;
