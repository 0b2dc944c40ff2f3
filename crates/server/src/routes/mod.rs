// crates/server/src/routes/mod.rs
//! API route handlers for the delineate server.

pub mod downloads;
pub mod errors;
pub mod health;
pub mod metrics;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod root;
pub mod trace_demo;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router.
///
/// Routes:
/// - GET  / - Service banner
/// - GET  /health - Storage health check (503 when unhealthy)
/// - POST /v1/download/initiate - Batch intake acknowledgement
/// - POST /v1/download/check - Synchronous availability check
/// - POST /v1/download/start - Run a download job to completion
/// - GET  /v1/download/status/{file_id} - Latest job for a file
/// - GET  /v1/errors - Server error log, most recent first
/// - GET  /v1/test/trace/success - Traced health check for trace browsing
/// - GET  /v1/test/trace/error - Deliberately failing traced request
/// - GET  /metrics - Prometheus exposition
/// - GET  /openapi.json - OpenAPI document (not in production)
pub fn api_routes(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .merge(root::router())
        .merge(health::router())
        .merge(downloads::router())
        .merge(errors::router())
        .merge(trace_demo::router())
        .merge(metrics::router());

    #[cfg(feature = "openapi")]
    let router = if state.serve_openapi {
        router.merge(openapi::router())
    } else {
        router
    };

    router.with_state(state)
}
