// crates/server/src/routes/downloads.rs
//! Download endpoints.
//!
//! - POST /v1/download/initiate
//! - POST /v1/download/check
//! - POST /v1/download/start
//! - GET  /v1/download/status/{file_id}

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use delineate_types::{
    CheckRequest, CheckResponse, FileId, InitiateRequest, InitiateResponse, StartRequest,
    StartResponse, StatusResponse,
};

use crate::error::{ApiError, ApiJson, ApiResult, ErrorResponse};
use crate::middleware::RequestContext;
use crate::oracle::Availability;
use crate::state::AppState;

pub const MAX_BATCH_FILE_IDS: usize = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct CheckQuery {
    /// `true` raises a deliberate internal error to exercise error reporting.
    pub sentry_test: Option<String>,
}

/// POST /v1/download/initiate - Acknowledge a batch of file ids.
///
/// Nothing is processed; the caller gets a batch job id back.
#[utoipa::path(
    post,
    path = "/v1/download/initiate",
    tag = "downloads",
    request_body = InitiateRequest,
    responses(
        (status = 200, body = InitiateResponse),
        (status = 400, body = ErrorResponse)
    )
)]
pub async fn initiate(ApiJson(req): ApiJson<InitiateRequest>) -> ApiResult<Json<InitiateResponse>> {
    if req.file_ids.is_empty() || req.file_ids.len() > MAX_BATCH_FILE_IDS {
        return Err(ApiError::BadRequest(format!(
            "file_ids must contain between 1 and {MAX_BATCH_FILE_IDS} entries, got {}",
            req.file_ids.len()
        )));
    }
    let response = InitiateResponse {
        job_id: uuid::Uuid::new_v4().to_string(),
        status: "queued".to_string(),
        total_file_ids: req.file_ids.len(),
    };
    tracing::info!(job_id = %response.job_id, total = response.total_file_ids, "Batch initiated");
    Ok(Json(response))
}

/// POST /v1/download/check - Synchronous availability lookup, no simulated latency.
#[utoipa::path(
    post,
    path = "/v1/download/check",
    tag = "downloads",
    request_body = CheckRequest,
    params(("sentry_test" = Option<String>, Query, description = "`true` triggers a deliberate 500")),
    responses(
        (status = 200, body = CheckResponse),
        (status = 400, body = ErrorResponse),
        (status = 500, body = ErrorResponse)
    )
)]
pub async fn check(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<CheckQuery>,
    ApiJson(req): ApiJson<CheckRequest>,
) -> ApiResult<Json<CheckResponse>> {
    if query.sentry_test.as_deref() == Some("true") {
        return Err(ApiError::Internal(format!(
            "Sentry test error triggered for file_id={}",
            req.file_id
        )));
    }

    let response = match state.oracle.check(req.file_id).await {
        Ok(Availability::Available { key, size }) => CheckResponse {
            file_id: req.file_id,
            available: true,
            s3_key: Some(key),
            size: Some(size),
        },
        Ok(Availability::Missing) => unavailable(req.file_id),
        Err(e) => {
            tracing::warn!(error = %e, trace_id = %ctx.trace.trace_id(), "Availability check failed");
            unavailable(req.file_id)
        }
    };
    Ok(Json(response))
}

fn unavailable(file_id: FileId) -> CheckResponse {
    CheckResponse {
        file_id,
        available: false,
        s3_key: None,
        size: None,
    }
}

/// POST /v1/download/start - Run a job; resolves after the simulated latency.
#[utoipa::path(
    post,
    path = "/v1/download/start",
    tag = "downloads",
    request_body = StartRequest,
    responses(
        (status = 200, description = "Terminal job outcome", body = StartResponse),
        (status = 400, body = ErrorResponse),
        (status = 408, description = "Request timeout elapsed before the job finished")
    )
)]
pub async fn start(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(req): ApiJson<StartRequest>,
) -> ApiResult<Json<StartResponse>> {
    let response = state.engine.start(req.file_id, &ctx.trace).await?;
    Ok(Json(response))
}

/// GET /v1/download/status/{file_id} - Latest job for a file, `not_found` if none.
#[utoipa::path(
    get,
    path = "/v1/download/status/{file_id}",
    tag = "downloads",
    params(("file_id" = u64, Path, description = "File id in [10000, 100000000]")),
    responses(
        (status = 200, body = StatusResponse),
        (status = 400, body = ErrorResponse)
    )
)]
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let file_id: FileId = raw.parse()?;
    Ok(Json(state.status.get(file_id)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/download/initiate", post(initiate))
        .route("/v1/download/check", post(check))
        .route("/v1/download/start", post(start))
        .route("/v1/download/status/{file_id}", get(status))
}
