// crates/observability/src/reporting.rs
//! Sentry setup and explicit error capture.
//!
//! Error-log entries are captured as Sentry messages with every tag copied
//! onto the scope, so `traceId` is searchable in the Sentry UI.

use std::borrow::Cow;

use delineate_types::{ErrorEvent, ErrorLevel};

/// Start the Sentry client. `None` when no DSN is configured or it does not parse.
pub(crate) fn init_sentry(dsn: Option<&str>, environment: &str) -> Option<sentry::ClientInitGuard> {
    let dsn = dsn.map(str::trim).filter(|d| !d.is_empty())?;
    let dsn = match dsn.parse::<sentry::types::Dsn>() {
        Ok(dsn) => dsn,
        Err(_) => return None,
    };
    Some(sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        release: sentry::release_name!(),
        environment: Some(Cow::Owned(environment.to_string())),
        attach_stacktrace: true,
        ..Default::default()
    }))
}

fn sentry_level(level: ErrorLevel) -> sentry::Level {
    match level {
        ErrorLevel::Error => sentry::Level::Error,
        ErrorLevel::Warning => sentry::Level::Warning,
        ErrorLevel::Info => sentry::Level::Info,
    }
}

/// Capture an error-log entry. No-op when Sentry is not initialised.
pub fn report(event: &ErrorEvent) {
    sentry::with_scope(
        |scope| {
            for (key, value) in &event.tags {
                scope.set_tag(key, value);
            }
            if let Some(extra) = &event.extra {
                scope.set_extra("context", extra.clone());
            }
            scope.set_extra("errorLogId", serde_json::Value::String(event.id.clone()));
        },
        || {
            sentry::capture_message(&event.message, sentry_level(event.level));
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_dsn_means_no_client() {
        assert!(init_sentry(None, "test").is_none());
        assert!(init_sentry(Some("   "), "test").is_none());
        assert!(init_sentry(Some("not a dsn"), "test").is_none());
    }

    #[test]
    fn test_report_without_client_is_noop() {
        let event = ErrorEvent::error("boom").with_trace_id("4bf92f3577b34da6a3ce929d0e0e4736");
        report(&event);
    }
}
