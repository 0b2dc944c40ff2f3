// crates/observability/src/trace_context.rs
//! W3C trace context (`traceparent`) handling.
//!
//! Encoding and decoding go through the OpenTelemetry `TraceContextPropagator`
//! so the header format is exactly what any OTel-instrumented peer emits.
//! Correlation downstream is plain string equality on the 32-char hex trace id.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use http::{HeaderMap, HeaderValue};
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{IdGenerator, RandomIdGenerator};

pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Parsed `traceparent`: trace id, parent span id and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceParent {
    trace_id: TraceId,
    span_id: SpanId,
    flags: TraceFlags,
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

impl TraceParent {
    /// Mint a new sampled root context.
    pub fn generate() -> Self {
        let ids = RandomIdGenerator::default();
        Self {
            trace_id: ids.new_trace_id(),
            span_id: ids.new_span_id(),
            flags: TraceFlags::SAMPLED,
        }
    }

    /// Same trace, fresh parent span id. Used once per outgoing request.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: RandomIdGenerator::default().new_span_id(),
            flags: self.flags,
        }
    }

    /// Decode from any OTel carrier. Invalid or all-zero contexts yield `None`.
    pub fn extract(carrier: &dyn Extractor) -> Option<Self> {
        let cx = TraceContextPropagator::new().extract(carrier);
        let span = cx.span();
        let span_context = span.span_context();
        if !span_context.is_valid() {
            return None;
        }
        Some(Self {
            trace_id: span_context.trace_id(),
            span_id: span_context.span_id(),
            flags: span_context.trace_flags(),
        })
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        Self::extract(&HeaderExtractor(headers))
    }

    pub fn parse(value: &str) -> Option<Self> {
        let mut carrier = HashMap::with_capacity(1);
        carrier.insert(TRACEPARENT_HEADER.to_string(), value.trim().to_string());
        Self::extract(&carrier)
    }

    /// 32 lower-case hex chars.
    pub fn trace_id(&self) -> String {
        self.trace_id.to_string()
    }

    /// 16 lower-case hex chars.
    pub fn span_id(&self) -> String {
        self.span_id.to_string()
    }

    pub fn is_sampled(&self) -> bool {
        self.flags.is_sampled()
    }

    pub fn span_context(&self) -> SpanContext {
        SpanContext::new(
            self.trace_id,
            self.span_id,
            self.flags,
            true,
            TraceState::default(),
        )
    }

    pub fn to_header_value(&self) -> String {
        let cx = Context::new().with_remote_span_context(self.span_context());
        let mut carrier: HashMap<String, String> = HashMap::new();
        TraceContextPropagator::new().inject_context(&cx, &mut carrier);
        carrier.remove(TRACEPARENT_HEADER).unwrap_or_default()
    }

    /// Set (or overwrite) the `traceparent` header.
    pub fn inject(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.to_header_value()) {
            headers.insert(TRACEPARENT_HEADER, value);
        }
    }
}

impl fmt::Display for TraceParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

impl FromStr for TraceParent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid traceparent: {s}"))
    }
}

/// Trace id carried by a `traceparent` header value, if it is well formed.
pub fn trace_id_from_header(value: &str) -> Option<String> {
    TraceParent::parse(value).map(|parent| parent.trace_id())
}

/// Parent `span` on the remote context so exported spans join the caller's trace.
///
/// Without the `otel` feature spans are not exported and this does nothing.
pub fn set_remote_parent(span: &tracing::Span, parent: &TraceParent) {
    #[cfg(feature = "otel")]
    {
        use tracing_opentelemetry::OpenTelemetrySpanExt;
        let cx = Context::new().with_remote_span_context(parent.span_context());
        let _ = span.set_parent(cx);
    }
    #[cfg(not(feature = "otel"))]
    {
        let _ = (span, parent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn test_parse_known_header() {
        let parent = TraceParent::parse(SAMPLE).unwrap();
        assert_eq!(parent.trace_id(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(parent.span_id(), "00f067aa0ba902b7");
        assert!(parent.is_sampled());
        assert_eq!(parent.to_header_value(), SAMPLE);
    }

    #[test]
    fn test_rejects_malformed_headers() {
        assert!(TraceParent::parse("").is_none());
        assert!(TraceParent::parse("not-a-trace").is_none());
        assert!(
            TraceParent::parse("00-00000000000000000000000000000000-00f067aa0ba902b7-01").is_none()
        );
        assert!(TraceParent::parse("00-4bf92f3577b34da6-00f067aa0ba902b7-01").is_none());
    }

    #[test]
    fn test_generated_ids_are_fixed_width_hex() {
        let parent = TraceParent::generate();
        let trace_id = parent.trace_id();
        assert_eq!(trace_id.len(), 32);
        assert!(trace_id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(parent.span_id().len(), 16);

        let header = parent.to_header_value();
        assert_eq!(header.len(), 55);
        assert_eq!(TraceParent::parse(&header), Some(parent));
    }

    #[test]
    fn test_child_keeps_trace_id() {
        let root = TraceParent::generate();
        let child = root.child();
        assert_eq!(root.trace_id(), child.trace_id());
        assert_ne!(root.span_id(), child.span_id());
    }

    #[test]
    fn test_header_map_round_trip() {
        let parent = TraceParent::parse(SAMPLE).unwrap();
        let mut headers = HeaderMap::new();
        parent.inject(&mut headers);
        assert_eq!(headers.get(TRACEPARENT_HEADER).unwrap(), SAMPLE);
        assert_eq!(TraceParent::from_headers(&headers), Some(parent));
        assert!(TraceParent::from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_trace_id_from_header() {
        assert_eq!(
            trace_id_from_header(SAMPLE).as_deref(),
            Some("4bf92f3577b34da6a3ce929d0e0e4736")
        );
        assert_eq!(trace_id_from_header("garbage"), None);
    }
}
