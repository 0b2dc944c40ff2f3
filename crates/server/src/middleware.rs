// crates/server/src/middleware.rs
//! Per-request trace context and 5xx capture.
//!
//! Every request gets a `TraceParent` (from the `traceparent` header, or
//! freshly minted) and a request id. Both are echoed on the response. A 5xx
//! response produces an error-log entry tagged with the trace id, which is
//! also sent to Sentry.

use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Instrument;

use delineate_observability::{set_remote_parent, TraceParent};
use delineate_types::ErrorEvent;

use crate::error::{ApiError, FailureReport};
use crate::metrics;
use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Inserted into request extensions by [`trace_context`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub trace: TraceParent,
    pub request_id: String,
}

fn request_id_from(request: &Request) -> Option<String> {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= 128)
        .map(str::to_owned)
}

pub async fn trace_context(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let trace = TraceParent::from_headers(request.headers()).unwrap_or_else(TraceParent::generate);
    let request_id =
        request_id_from(&request).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    request.extensions_mut().insert(RequestContext {
        trace,
        request_id: request_id.clone(),
    });

    let span = tracing::info_span!(
        "request",
        method = %method,
        path = %path,
        trace_id = %trace.trace_id(),
        request_id = %request_id,
    );
    set_remote_parent(&span, &trace);

    let started = tokio::time::Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    let status = response.status();
    let path_label = metrics::path_label(&path);
    metrics::record_request(method.as_str(), &path_label, status.as_u16(), started.elapsed());

    if status.is_server_error() {
        let message = response
            .extensions()
            .get::<FailureReport>()
            .map(|report| report.message.clone())
            .unwrap_or_else(|| format!("{method} {path} failed with status {status}"));
        let event = ErrorEvent::error(message)
            .with_trace_id(trace.trace_id())
            .with_tag("endpoint", path.clone())
            .with_tag("method", method.to_string())
            .with_tag("status", status.as_u16().to_string())
            .with_tag("requestId", request_id.clone())
            .with_extra(serde_json::json!({ "source": "server" }));

        span.in_scope(|| {
            tracing::error!(
                error = %event.message,
                status = status.as_u16(),
                error_id = %event.id,
                "Request failed"
            );
        });
        delineate_observability::report(&event);
        state.errors.record(event);
        metrics::record_server_error(&path_label);
    }

    trace.inject(response.headers_mut());
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// `CatchPanicLayer` handler: a panicking handler becomes a generic 500.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_panic_response_is_generic_500() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let report = response.extensions().get::<FailureReport>().unwrap();
        assert_eq!(report.message, "Internal server error: handler panicked: boom");
    }

    #[test]
    fn test_request_id_header_is_sanitized() {
        let request = Request::builder()
            .header(REQUEST_ID_HEADER, "  req-42 ")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(request_id_from(&request).as_deref(), Some("req-42"));

        let request = Request::builder()
            .header(REQUEST_ID_HEADER, "")
            .body(axum::body::Body::empty())
            .unwrap();
        assert!(request_id_from(&request).is_none());
    }
}
