// crates/server/src/lib.rs
//! delineate server library.
//!
//! Axum HTTP API that emulates long-running downloads: `start` resolves only
//! after a simulated fulfilment delay, while `status` lets a dashboard poll the
//! job record in the meantime.

pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod middleware;
pub mod oracle;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use config::{AppEnv, ConfigError, LogFormat, ServerConfig};
pub use error::*;
pub use metrics::init_metrics;
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use delineate_observability::TRACEPARENT_HEADER;

const SECURE_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
    ("origin-agent-cluster", "?1"),
];

/// Only sent in production; they break cross-origin dashboards in development.
const CROSS_ORIGIN_ISOLATION: &[(&str, &str)] = &[
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
];

fn with_secure_headers(router: Router, production: bool) -> Router {
    let isolation: &'static [(&'static str, &'static str)] =
        if production { CROSS_ORIGIN_ISOLATION } else { &[] };
    SECURE_HEADERS
        .iter()
        .chain(isolation)
        .fold(router, |router, &(name, value)| {
            router.layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            ))
        })
}

fn cors_layer(origins: Option<&[axum::http::HeaderValue]>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(TRACEPARENT_HEADER),
            HeaderName::from_static(middleware::REQUEST_ID_HEADER),
            HeaderName::from_static("sentry-trace"),
            HeaderName::from_static("baggage"),
        ])
        .expose_headers([
            HeaderName::from_static(TRACEPARENT_HEADER),
            HeaderName::from_static(middleware::REQUEST_ID_HEADER),
            HeaderName::from_static(ratelimit::RATE_LIMIT_LIMIT_HEADER),
            HeaderName::from_static(ratelimit::RATE_LIMIT_REMAINING_HEADER),
        ])
        .max_age(Duration::from_secs(86_400));
    match origins {
        None => cors.allow_origin(Any),
        Some(list) => cors.allow_origin(AllowOrigin::list(list.iter().cloned())),
    }
}

/// Create the Axum application with all routes and middleware.
///
/// Layers, outermost first:
/// - CORS
/// - security headers
/// - HTTP request tracing
/// - trace context, request id and 5xx capture
/// - per-client rate limit (429)
/// - request timeout (408)
/// - panic catcher (500)
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.cors_origins.as_deref());

    let app = api_routes(state.clone())
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(TimeoutLayer::new(state.request_timeout))
        .layer(axum::middleware::from_fn_with_state(
            state.rate_limit.clone(),
            ratelimit::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::trace_context,
        ))
        .layer(TraceLayer::new_for_http());

    with_secure_headers(app, state.production).layer(cors)
}

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn app() -> Router {
        create_app(AppState::builder(Arc::new(MockOracle)).build())
    }

    /// Helper to make a GET request to the app.
    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_str = String::from_utf8(body.to_vec()).unwrap();

        (status, body_str)
    }

    // ========================================================================
    // Basic Endpoint Tests
    // ========================================================================

    #[tokio::test]
    async fn test_root_endpoint() {
        let (status, body) = get(app(), "/").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["message"].is_string());
    }

    #[tokio::test]
    async fn test_health_endpoint_with_mock_storage() {
        let (status, body) = get(app(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["checks"]["storage"], "ok");
    }

    #[tokio::test]
    async fn test_error_log_starts_empty() {
        let (status, body) = get(app(), "/v1/errors").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn test_404_for_unknown_route() {
        let (status, _body) = get(app(), "/api/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[cfg(feature = "openapi")]
    #[tokio::test]
    async fn test_openapi_hidden_in_production() {
        let (status, _) = get(app(), "/openapi.json").await;
        assert_eq!(status, StatusCode::OK);

        let production = AppState::builder(Arc::new(MockOracle))
            .serve_openapi(false)
            .build();
        let (status, _) = get(create_app(production), "/openapi.json").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // ========================================================================
    // Header Tests
    // ========================================================================

    #[tokio::test]
    async fn test_trace_headers_echoed() {
        let traceparent = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("traceparent", traceparent)
                    .header("x-request-id", "req-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get("traceparent").unwrap(), traceparent);
        assert_eq!(response.headers().get("x-request-id").unwrap(), "req-1");
    }

    #[tokio::test]
    async fn test_trace_minted_when_header_missing_or_invalid() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("traceparent", "garbage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let echoed = response.headers().get("traceparent").unwrap().to_str().unwrap();
        let trace_id = delineate_observability::trace_id_from_header(echoed).unwrap();
        assert_eq!(trace_id.len(), 32);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_cors_allows_traceparent() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/v1/download/start")
                    .header("Origin", "http://localhost:5173")
                    .header("Access-Control-Request-Method", "POST")
                    .header("Access-Control-Request-Headers", "traceparent,content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        let allowed = headers
            .get("access-control-allow-headers")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(allowed.contains("traceparent"));
    }

    #[tokio::test]
    async fn test_secure_headers_outside_production() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
        assert_eq!(headers["referrer-policy"], "no-referrer");
        assert!(!headers.contains_key("cross-origin-opener-policy"));
        assert!(!headers.contains_key("cross-origin-resource-policy"));
    }

    #[tokio::test]
    async fn test_cross_origin_isolation_in_production() {
        let state = AppState::builder(Arc::new(MockOracle)).production(true).build();
        let response = create_app(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let headers = response.headers();
        assert_eq!(headers["cross-origin-opener-policy"], "same-origin");
        assert_eq!(headers["cross-origin-resource-policy"], "same-origin");
        assert_eq!(headers["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn test_cors_allow_list() {
        let state = AppState::builder(Arc::new(MockOracle))
            .cors_origins(Some(vec!["http://localhost:5173".parse().unwrap()]))
            .build();
        let response = create_app(state)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Origin", "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:5173"
        );
    }
}
