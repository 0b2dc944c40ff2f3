// crates/server/src/routes/errors.rs
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};

use delineate_types::ErrorEvent;

use crate::state::AppState;

/// GET /v1/errors - Server error log, most recent first.
#[utoipa::path(get, path = "/v1/errors", tag = "meta", responses((status = 200, body = [ErrorEvent])))]
pub async fn list_errors(State(state): State<Arc<AppState>>) -> Json<Vec<ErrorEvent>> {
    Json(state.errors.entries())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/v1/errors", get(list_errors))
}
