// crates/server/src/routes/health.rs
//! Health check endpoint for the API.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

use delineate_types::HealthResponse;

use crate::state::AppState;

/// GET /health - Storage health check.
///
/// Returns 200 when the availability oracle can reach its store, 503 otherwise.
#[utoipa::path(
    get,
    path = "/health",
    tag = "meta",
    responses(
        (status = 200, description = "Storage reachable", body = HealthResponse),
        (status = 503, description = "Storage unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let storage_ok = state.oracle.health().await;
    let status = if storage_ok {
        StatusCode::OK
    } else {
        tracing::warn!(oracle = state.oracle.name(), "Storage health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(HealthResponse::from_storage(storage_ok)))
}

/// Create the health routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}
