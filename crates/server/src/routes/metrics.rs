// crates/server/src/routes/metrics.rs
//! `GET /metrics`: download job and request metrics for Prometheus scraping.

use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::metrics::render_metrics;
use crate::state::AppState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Job counters (`downloads_started_total`, `downloads_finished_total{status}`),
/// the `downloads_in_flight` gauge, processing time and per-route request stats.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "meta",
    responses(
        (status = 200, description = "Prometheus text exposition", body = String, content_type = "text/plain"),
        (status = 503, description = "Recorder not installed")
    )
)]
pub async fn download_metrics() -> Response {
    let Some(body) = render_metrics() else {
        tracing::debug!("Metrics scraped before the recorder was installed");
        return (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response();
    };
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response()
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(download_metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    async fn send(app: Router, method: &str, uri: &str, body: Body) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_finished_jobs_show_up_by_status() {
        crate::metrics::init_metrics();
        let app = crate::create_app(AppState::builder(Arc::new(MockOracle)).build());

        for file_id in [70007, 70001] {
            let body = Body::from(format!(r#"{{"file_id":{file_id}}}"#));
            let (status, _) = send(app.clone(), "POST", "/v1/download/start", body).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, text) = send(app, "GET", "/metrics", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("downloads_started_total"));
        assert!(text.contains(r#"downloads_finished_total{status="completed"}"#));
        assert!(text.contains(r#"downloads_finished_total{status="failed"}"#));
        assert!(text.contains("downloads_in_flight"));
        assert!(text.contains(r#"path="/v1/download/start""#));
    }
}
