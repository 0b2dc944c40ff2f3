// crates/server/src/ratelimit.rs
//! Per-client rate limiting.
//!
//! Each client key gets `max_requests` per window: the whole allowance is
//! available at once and refills evenly over the window (GCRA, via governor).
//!
//! The key is the first `X-Forwarded-For` entry, then `X-Real-IP`, then a
//! shared `anonymous` bucket.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::StateInformationMiddleware,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};

use crate::metrics;

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

const ANONYMOUS_KEY: &str = "anonymous";

type KeyedLimiter =
    RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock, StateInformationMiddleware>;

/// Limiter shared by every request; cheap to clone.
#[derive(Clone)]
pub struct RateLimitState {
    inner: Option<Arc<RateLimitStateInner>>,
}

struct RateLimitStateInner {
    limiter: KeyedLimiter,
    clock: DefaultClock,
    limit: u32,
}

/// Remaining allowance after an accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    pub limit: u32,
    pub remaining: u32,
}

#[derive(Debug)]
pub struct RateLimitError {
    pub limit: u32,
    pub retry_after_secs: u64,
}

impl RateLimitState {
    /// No limiting at all.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn new(window: Duration, max_requests: u32) -> Self {
        let burst = NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN);
        let period = (window / burst.get()).max(Duration::from_nanos(1));
        let Some(quota) = Quota::with_period(period) else {
            tracing::warn!(?window, max_requests, "Invalid rate limit quota, limiting disabled");
            return Self::disabled();
        };
        let limiter = RateLimiter::keyed(quota.allow_burst(burst)).with_middleware::<StateInformationMiddleware>();
        Self {
            inner: Some(Arc::new(RateLimitStateInner {
                limiter,
                clock: DefaultClock::default(),
                limit: burst.get(),
            })),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Count one request against `key`.
    pub fn check(&self, key: &str) -> Result<Option<Allowance>, RateLimitError> {
        let Some(inner) = &self.inner else {
            return Ok(None);
        };
        match inner.limiter.check_key(&key.to_string()) {
            Ok(snapshot) => Ok(Some(Allowance {
                limit: inner.limit,
                remaining: snapshot.remaining_burst_capacity(),
            })),
            Err(not_until) => {
                let wait = not_until.wait_time_from(inner.clock.now());
                Err(RateLimitError {
                    limit: inner.limit,
                    retry_after_secs: wait.as_secs() + 1,
                })
            }
        }
    }

    /// Drop keys whose allowance has fully refilled.
    pub fn cleanup(&self) -> usize {
        let Some(inner) = &self.inner else {
            return 0;
        };
        let before = inner.limiter.len();
        inner.limiter.retain_recent();
        inner.limiter.shrink_to_fit();
        before.saturating_sub(inner.limiter.len())
    }
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": "Too Many Requests",
            "message": format!(
                "Rate limit exceeded. Retry after {} seconds.",
                self.retry_after_secs
            ),
            "retry_after": self.retry_after_secs,
        });

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert("retry-after", HeaderValue::from(self.retry_after_secs));
        headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(self.limit));
        headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(0u32));
        response
    }
}

/// Client key for a request.
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(ANONYMOUS_KEY)
        .to_string()
}

pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !rate_limit.is_enabled() {
        return next.run(req).await;
    }

    let key = client_key(req.headers());
    match rate_limit.check(&key) {
        Ok(allowance) => {
            let mut response = next.run(req).await;
            if let Some(allowance) = allowance {
                let headers = response.headers_mut();
                headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(allowance.limit));
                headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(allowance.remaining));
            }
            response
        }
        Err(e) => {
            tracing::warn!(client = %key, retry_after_secs = e.retry_after_secs, "Rate limit exceeded");
            metrics::record_rate_limited();
            e.into_response()
        }
    }
}

/// Periodically forget idle clients.
pub fn spawn_cleanup_task(state: RateLimitState, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let evicted = state.cleanup();
            if evicted > 0 {
                tracing::debug!(evicted, "Rate limiter dropped idle clients");
            }
        }
    })
}
