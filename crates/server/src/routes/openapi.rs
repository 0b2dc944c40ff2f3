// crates/server/src/routes/openapi.rs
//! OpenAPI document at `GET /openapi.json`.

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use delineate_types::{
    CheckRequest, CheckResponse, CheckState, DownloadStatus, ErrorEvent, ErrorLevel, FileId,
    HealthChecks, HealthResponse, HealthState, InitiateRequest, InitiateResponse, JobStatus,
    MessageResponse, StartRequest, StartResponse, StatusResponse,
};

use super::trace_demo::{TraceErrorResponse, TraceSuccessResponse};
use crate::error::ErrorResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "delineate",
        description = "Long-running download emulation with status polling"
    ),
    paths(
        super::root::root,
        super::health::health_check,
        super::downloads::initiate,
        super::downloads::check,
        super::downloads::start,
        super::downloads::status,
        super::errors::list_errors,
        super::metrics::download_metrics,
        super::trace_demo::trace_success,
        super::trace_demo::trace_error,
    ),
    components(schemas(
        FileId,
        JobStatus,
        DownloadStatus,
        MessageResponse,
        CheckRequest,
        CheckResponse,
        StartRequest,
        StartResponse,
        InitiateRequest,
        InitiateResponse,
        StatusResponse,
        HealthResponse,
        HealthChecks,
        HealthState,
        CheckState,
        ErrorEvent,
        ErrorLevel,
        ErrorResponse,
        TraceSuccessResponse,
        TraceErrorResponse,
    )),
    tags(
        (name = "downloads", description = "Download jobs"),
        (name = "meta", description = "Health, errors and service info"),
        (name = "test", description = "Tracing demos")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/openapi.json", get(openapi_json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_download_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/v1/download/start"));
        assert!(paths.iter().any(|p| p.as_str() == "/v1/download/status/{file_id}"));
        assert!(paths.iter().any(|p| p.as_str() == "/v1/errors"));
        assert!(paths.iter().any(|p| p.as_str() == "/v1/test/trace/error"));
        assert!(paths.iter().any(|p| p.as_str() == "/metrics"));
    }
}
