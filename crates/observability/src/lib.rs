// crates/observability/src/lib.rs
//! Logging, error reporting and trace correlation shared by the delineate
//! server and dashboard.
//!
//! - `init`: tracing subscriber (fmt + Sentry breadcrumbs, OTLP with `otel`)
//! - `TraceParent`: W3C trace context carried on every request
//! - `ErrorLog`: bounded, most-recent-first list of user-visible errors
//! - `report`: send an error-log entry to Sentry with its tags

pub mod error_log;
pub mod logging;
pub mod reporting;
pub mod trace_context;

pub use error_log::ErrorLog;
pub use logging::{init, ObservabilityConfig, ObservabilityGuard};
pub use reporting::report;
pub use trace_context::{set_remote_parent, trace_id_from_header, TraceParent, TRACEPARENT_HEADER};
