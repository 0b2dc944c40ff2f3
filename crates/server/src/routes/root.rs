// crates/server/src/routes/root.rs
use std::sync::Arc;

use axum::{routing::get, Json, Router};

use delineate_types::MessageResponse;

use crate::state::AppState;

#[utoipa::path(get, path = "/", tag = "meta", responses((status = 200, body = MessageResponse)))]
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: format!("delineate download API v{}", env!("CARGO_PKG_VERSION")),
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(root))
}
