// crates/dashboard/src/api.rs
//! HTTP client for the download API.
//!
//! Every request carries a `traceparent` header. Callers pass the trace of the
//! job they act on; the client sends a child span of it, or a fresh root trace
//! when there is none. Failed calls land in the client error log tagged with
//! the trace id that went out on the wire.

use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use delineate_observability::{report, trace_id_from_header, ErrorLog, TraceParent, TRACEPARENT_HEADER};
use delineate_types::{CheckResponse, ErrorEvent, FileId, StartResponse, StatusResponse};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("network error calling {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("unexpected response body from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ClientError {
    /// Short classifier used as the `error_type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Build(_) => "client",
            ClientError::Transport { .. } => "network",
            ClientError::Status { .. } => "http",
            ClientError::Decode { .. } => "decode",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The calls the dashboard makes. The tracker only depends on this trait.
#[async_trait]
pub trait DownloadApi: Send + Sync {
    /// Long-running: resolves once the server job has finished.
    async fn start_download(
        &self,
        file_id: FileId,
        trace: Option<&TraceParent>,
    ) -> Result<StartResponse, ClientError>;

    async fn fetch_status(
        &self,
        file_id: FileId,
        trace: Option<&TraceParent>,
    ) -> Result<StatusResponse, ClientError>;

    async fn check(
        &self,
        file_id: FileId,
        trace: Option<&TraceParent>,
    ) -> Result<CheckResponse, ClientError>;

    /// `check` with `sentry_test=true`; the server answers 500 on purpose.
    async fn trigger_error(
        &self,
        file_id: FileId,
        trace: Option<&TraceParent>,
    ) -> Result<CheckResponse, ClientError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    errors: ErrorLog,
}

impl ApiClient {
    /// No overall request timeout: `start` legitimately takes minutes.
    pub fn new(base_url: &str, errors: ErrorLog) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self::with_client(client, base_url, errors))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, errors: ErrorLog) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            errors,
        }
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: Option<&str>,
        body: Option<serde_json::Value>,
        trace: Option<&TraceParent>,
    ) -> Result<T, ClientError> {
        let trace = trace.map_or_else(TraceParent::generate, TraceParent::child);
        let mut headers = HeaderMap::new();
        trace.inject(&mut headers);

        let url = match query {
            Some(query) => format!("{}{}?{}", self.base_url, endpoint, query),
            None => format!("{}{}", self.base_url, endpoint),
        };
        let mut request = self.client.request(method.clone(), url).headers(headers.clone());
        if let Some(body) = body {
            request = request.json(&body);
        }

        let result = execute(request, endpoint).await;
        if let Err(err) = &result {
            self.record_failure(&method, endpoint, &headers, err);
        }
        result
    }

    fn record_failure(&self, method: &Method, endpoint: &str, headers: &HeaderMap, err: &ClientError) {
        let trace_id = headers
            .get(TRACEPARENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(trace_id_from_header)
            .unwrap_or_default();

        let title = match err {
            ClientError::Transport { .. } => "Network Error",
            _ => "API Error",
        };
        let mut event = ErrorEvent::error(format!("{title}: {err}"))
            .with_tag("endpoint", endpoint)
            .with_tag("method", method.as_str())
            .with_tag("error_type", err.kind())
            .with_trace_id(trace_id.as_str())
            .with_extra(json!({ "source": "dashboard" }));
        if let Some(status) = err.status() {
            event = event.with_tag("status", status.to_string());
        }

        tracing::warn!(%endpoint, %trace_id, error = %err, "API call failed");
        report(&event);
        self.errors.record(event);
    }
}

async fn execute<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    endpoint: &str,
) -> Result<T, ClientError> {
    let response = request.send().await.map_err(|source| ClientError::Transport {
        endpoint: endpoint.to_string(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("error").to_string(),
        };
        return Err(ClientError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message,
        });
    }

    response.json::<T>().await.map_err(|source| ClientError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

#[async_trait]
impl DownloadApi for ApiClient {
    async fn start_download(
        &self,
        file_id: FileId,
        trace: Option<&TraceParent>,
    ) -> Result<StartResponse, ClientError> {
        self.send(
            Method::POST,
            "/v1/download/start",
            None,
            Some(json!({ "file_id": file_id })),
            trace,
        )
        .await
    }

    async fn fetch_status(
        &self,
        file_id: FileId,
        trace: Option<&TraceParent>,
    ) -> Result<StatusResponse, ClientError> {
        let endpoint = format!("/v1/download/status/{file_id}");
        self.send(Method::GET, &endpoint, None, None, trace).await
    }

    async fn check(
        &self,
        file_id: FileId,
        trace: Option<&TraceParent>,
    ) -> Result<CheckResponse, ClientError> {
        self.send(
            Method::POST,
            "/v1/download/check",
            None,
            Some(json!({ "file_id": file_id })),
            trace,
        )
        .await
    }

    async fn trigger_error(
        &self,
        file_id: FileId,
        trace: Option<&TraceParent>,
    ) -> Result<CheckResponse, ClientError> {
        self.send(
            Method::POST,
            "/v1/download/check",
            Some("sentry_test=true"),
            Some(json!({ "file_id": file_id })),
            trace,
        )
        .await
    }
}
