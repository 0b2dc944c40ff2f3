// crates/server/src/routes/trace_demo.rs
//! Demo endpoints for looking at traces in a trace browser.
//!
//! - GET /v1/test/trace/success
//! - GET /v1/test/trace/error

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use utoipa::ToSchema;

use crate::error::FailureReport;
use crate::middleware::RequestContext;
use crate::state::AppState;

/// Host that never resolves; the error demo fails trying to reach it.
pub const UNREACHABLE_DEMO_URL: &str = "http://invalid-host-that-does-not-exist-12345:8080/api";

const DEMO_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const CHILD_WORK: Duration = Duration::from_millis(50);

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TraceSuccessResponse {
    pub message: String,
    pub status: String,
    pub health: String,
    pub trace_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TraceErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub trace_id: String,
}

/// GET /v1/test/trace/success - A traced health check with a child span.
#[utoipa::path(
    get,
    path = "/v1/test/trace/success",
    tag = "test",
    responses((status = 200, description = "Successful trace demo", body = TraceSuccessResponse))
)]
pub async fn trace_success(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> Json<TraceSuccessResponse> {
    let span = tracing::info_span!(
        "test.success.trace",
        "test.type" = "success_demo",
        operation = "health_check",
        "health.status" = tracing::field::Empty,
        "otel.status_code" = tracing::field::Empty,
    );

    let healthy = async {
        tracing::info!("Checking service health");
        let healthy = state.oracle.health().await;
        tracing::info!(healthy, "Health check completed");
        healthy
    }
    .instrument(span.clone())
    .await;
    let health = if healthy { "healthy" } else { "unhealthy" };
    span.record("health.status", health);

    let child = tracing::info_span!(
        parent: &span,
        "test.success.child_operation",
        "child.operation" = "data_processing",
        "processing.time_ms" = tracing::field::Empty,
    );
    let started = Instant::now();
    tokio::time::sleep(CHILD_WORK).instrument(child.clone()).await;
    child.record("processing.time_ms", started.elapsed().as_millis() as u64);
    span.record("otel.status_code", "OK");

    Json(TraceSuccessResponse {
        message: "Successful trace demo".to_string(),
        status: "success".to_string(),
        health: health.to_string(),
        trace_id: ctx.trace.trace_id(),
    })
}

/// GET /v1/test/trace/error - Fails a request to an unreachable host on purpose.
#[utoipa::path(
    get,
    path = "/v1/test/trace/error",
    tag = "test",
    responses(
        (status = 200, description = "The demo host answered after all"),
        (status = 500, description = "Intentional error for tracing demo", body = TraceErrorResponse)
    )
)]
pub async fn trace_error(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> Response {
    let span = tracing::info_span!(
        "test.error.trace",
        "test.type" = "error_demo",
        "error.scenario" = "tcp_connection_failure",
        "error.name" = tracing::field::Empty,
        "error.message" = tracing::field::Empty,
        "otel.status_code" = tracing::field::Empty,
    );

    let target = state.trace_demo_url.clone();
    let outcome = async {
        tracing::info!(url = %target, "Attempting connection to invalid URL");
        let client = reqwest::Client::builder()
            .timeout(DEMO_REQUEST_TIMEOUT)
            .build()?;
        client.get(&target).send().await
    }
    .instrument(span.clone())
    .await;

    match outcome {
        Ok(response) => {
            tracing::warn!(status = response.status().as_u16(), "Trace demo host answered");
            Json(serde_json::json!({ "message": "Unexpected success" })).into_response()
        }
        Err(e) => {
            let kind = error_kind(&e);
            let message = e.to_string();
            span.record("error.name", kind);
            span.record("error.message", message.as_str());
            span.record("otel.status_code", "ERROR");
            span.in_scope(|| tracing::error!(error = %message, kind, "Trace demo request failed"));

            let body = TraceErrorResponse {
                error: "Intentional Error for Tracing Demo".to_string(),
                message: message.clone(),
                kind: kind.to_string(),
                trace_id: ctx.trace.trace_id(),
            };
            let mut response = (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            response.extensions_mut().insert(FailureReport {
                message: format!("Intentional Error for Tracing Demo: {message}"),
            });
            response
        }
    }
}

fn error_kind(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "TimeoutError"
    } else if err.is_connect() {
        "ConnectError"
    } else if err.is_builder() {
        "BuilderError"
    } else {
        "NetworkError"
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/test/trace/success", get(trace_success))
        .route("/v1/test/trace/error", get(trace_error))
}
