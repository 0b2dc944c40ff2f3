// crates/observability/src/logging.rs
//! Tracing subscriber setup.
//!
//! Layers, outermost first: `EnvFilter`, fmt (plain or JSON), Sentry
//! breadcrumbs, and with the `otel` feature an OTLP span exporter.

use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::reporting::init_sentry;

pub const DEFAULT_FILTER: &str = "info,delineate_server=debug,tower_http=info";

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub service_name: String,
    pub environment: String,
    pub json_logs: bool,
    /// Used when `RUST_LOG` is unset.
    pub default_filter: String,
    pub sentry_dsn: Option<String>,
    /// gRPC collector endpoint. Ignored without the `otel` feature.
    pub otlp_endpoint: Option<String>,
}

impl ObservabilityConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            environment: "development".to_string(),
            json_logs: false,
            default_filter: DEFAULT_FILTER.to_string(),
            sentry_dsn: None,
            otlp_endpoint: None,
        }
    }
}

/// Keeps the Sentry client and span exporter alive. Flushes both on drop.
pub struct ObservabilityGuard {
    sentry: Option<sentry::ClientInitGuard>,
    #[cfg(feature = "otel")]
    tracer_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl ObservabilityGuard {
    pub fn sentry_enabled(&self) -> bool {
        self.sentry.as_ref().is_some_and(|guard| guard.is_enabled())
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        if let Some(provider) = self.tracer_provider.take() {
            let _ = provider.shutdown();
        }
    }
}

/// Install the global subscriber. Calling it twice keeps the first subscriber.
pub fn init(config: ObservabilityConfig) -> ObservabilityGuard {
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    // Sentry must exist before the sentry-tracing layer sees its first event.
    let sentry = init_sentry(config.sentry_dsn.as_deref(), &config.environment);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let fmt_layer = if config.json_logs {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).compact().boxed()
    };

    // Sentry events come from explicit `report` calls; tracing output only adds breadcrumbs.
    let sentry_layer = sentry_tracing::layer().event_filter(|metadata| match *metadata.level() {
        tracing::Level::TRACE | tracing::Level::DEBUG => sentry_tracing::EventFilter::Ignore,
        _ => sentry_tracing::EventFilter::Breadcrumb,
    });

    #[cfg(feature = "otel")]
    let (tracer_provider, otel_error) = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => match otel::tracer_provider(endpoint, &config.service_name) {
            Ok(provider) => (Some(provider), None),
            Err(e) => (None, Some(e)),
        },
        None => (None, None),
    };
    #[cfg(feature = "otel")]
    let otel_layer = tracer_provider.as_ref().map(|provider| {
        use opentelemetry::trace::TracerProvider as _;
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });
    #[cfg(not(feature = "otel"))]
    let otel_layer: Option<tracing_subscriber::layer::Identity> = None;

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(sentry_layer)
        .with(otel_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            service = %config.service_name,
            environment = %config.environment,
            sentry = sentry.is_some(),
            "Tracing initialized"
        );
    }
    #[cfg(feature = "otel")]
    if let Some(e) = otel_error {
        tracing::warn!(error = %e, "OTLP exporter disabled");
    }
    #[cfg(not(feature = "otel"))]
    if config.otlp_endpoint.is_some() {
        tracing::warn!("OTLP endpoint configured but the `otel` feature is not compiled in");
    }

    ObservabilityGuard {
        sentry,
        #[cfg(feature = "otel")]
        tracer_provider,
    }
}

#[cfg(feature = "otel")]
mod otel {
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use opentelemetry_sdk::Resource;

    pub(super) fn tracer_provider(
        endpoint: &str,
        service_name: &str,
    ) -> Result<SdkTracerProvider, opentelemetry_otlp::ExporterBuildError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;
        let provider = SdkTracerProvider::builder()
            .with_resource(
                Resource::builder()
                    .with_service_name(service_name.to_string())
                    .build(),
            )
            .with_batch_exporter(exporter)
            .build();
        opentelemetry::global::set_tracer_provider(provider.clone());
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ObservabilityConfig::new("delineate-server");
        assert_eq!(config.default_filter, DEFAULT_FILTER);
        assert!(!config.json_logs);
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let first = init(ObservabilityConfig::new("test"));
        let second = init(ObservabilityConfig::new("test"));
        assert!(!first.sentry_enabled());
        assert!(!second.sentry_enabled());
    }
}
