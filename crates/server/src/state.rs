// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use delineate_observability::ErrorLog;

use crate::config::ServerConfig;
use crate::jobs::{DownloadEngine, InMemoryJobStore, JobStore, LatencyPolicy, StatusService};
use crate::oracle::{AvailabilityOracle, MockOracle, S3Oracle};
use crate::ratelimit::RateLimitState;
use crate::routes::trace_demo::UNREACHABLE_DEMO_URL;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub engine: DownloadEngine,
    pub status: StatusService,
    pub oracle: Arc<dyn AvailabilityOracle>,
    /// Server-side error log exposed at `GET /v1/errors`.
    pub errors: ErrorLog,
    pub request_timeout: Duration,
    pub serve_openapi: bool,
    /// `None` allows any origin.
    pub cors_origins: Option<Vec<http::HeaderValue>>,
    pub rate_limit: RateLimitState,
    /// Adds the cross-origin isolation headers.
    pub production: bool,
    /// Target the error trace demo tries to reach.
    pub trace_demo_url: String,
}

impl AppState {
    /// Build state from configuration, choosing the oracle by whether a bucket is set.
    pub async fn from_config(config: &ServerConfig) -> Arc<Self> {
        let oracle: Arc<dyn AvailabilityOracle> = if config.uses_object_store() {
            Arc::new(S3Oracle::new(&config.s3_settings()).await)
        } else {
            Arc::new(MockOracle)
        };
        Self::builder(oracle)
            .latency(config.latency_policy())
            .download_base_url(&config.download_base_url)
            .request_timeout(config.request_timeout())
            .serve_openapi(!config.is_production())
            .production(config.is_production())
            .cors_origins(config.cors_allow_list().ok().flatten())
            .rate_limit(RateLimitState::new(
                config.rate_limit_window(),
                config.rate_limit_max_requests,
            ))
            .build()
    }

    pub fn builder(oracle: Arc<dyn AvailabilityOracle>) -> AppStateBuilder {
        AppStateBuilder {
            oracle,
            store: Arc::new(InMemoryJobStore::new()),
            latency: LatencyPolicy::disabled(),
            download_base_url: "https://storage.example.com".to_string(),
            request_timeout: Duration::from_secs(30),
            serve_openapi: true,
            cors_origins: None,
            errors: ErrorLog::new(),
            rate_limit: RateLimitState::disabled(),
            production: false,
            trace_demo_url: UNREACHABLE_DEMO_URL.to_string(),
        }
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

pub struct AppStateBuilder {
    oracle: Arc<dyn AvailabilityOracle>,
    store: Arc<dyn JobStore>,
    latency: LatencyPolicy,
    download_base_url: String,
    request_timeout: Duration,
    serve_openapi: bool,
    cors_origins: Option<Vec<http::HeaderValue>>,
    errors: ErrorLog,
    rate_limit: RateLimitState,
    production: bool,
    trace_demo_url: String,
}

impl AppStateBuilder {
    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = store;
        self
    }

    pub fn latency(mut self, latency: LatencyPolicy) -> Self {
        self.latency = latency;
        self
    }

    pub fn download_base_url(mut self, url: &str) -> Self {
        self.download_base_url = url.to_string();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn serve_openapi(mut self, serve: bool) -> Self {
        self.serve_openapi = serve;
        self
    }

    pub fn cors_origins(mut self, origins: Option<Vec<http::HeaderValue>>) -> Self {
        self.cors_origins = origins;
        self
    }

    pub fn errors(mut self, errors: ErrorLog) -> Self {
        self.errors = errors;
        self
    }

    pub fn rate_limit(mut self, rate_limit: RateLimitState) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    pub fn trace_demo_url(mut self, url: &str) -> Self {
        self.trace_demo_url = url.to_string();
        self
    }

    pub fn build(self) -> Arc<AppState> {
        Arc::new(AppState {
            start_time: Instant::now(),
            engine: DownloadEngine::new(
                self.store.clone(),
                self.oracle.clone(),
                self.latency,
                &self.download_base_url,
            ),
            status: StatusService::new(self.store),
            oracle: self.oracle,
            errors: self.errors,
            request_timeout: self.request_timeout,
            serve_openapi: self.serve_openapi,
            cors_origins: self.cors_origins,
            rate_limit: self.rate_limit,
            production: self.production,
            trace_demo_url: self.trace_demo_url,
        })
    }
}
