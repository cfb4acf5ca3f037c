//! Tracing setup: fmt output plus an optional OTLP span exporter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "atlas_backend=debug,tower_http=debug,sqlx::query=info";

/// Initialize the global tracing subscriber.
///
/// Hold the returned guard for the lifetime of the process so pending spans
/// are flushed on shutdown. If the OTLP exporter cannot be built, logging
/// continues on stdout only.
pub fn init_tracing(otel_endpoint: Option<&str>, service_name: &str) -> Option<OtelGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let Some(endpoint) = otel_endpoint else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        return None;
    };

    match build_provider(endpoint, service_name) {
        Ok(provider) => {
            use opentelemetry::trace::TracerProvider;

            let tracer = provider.tracer("atlas-backend");
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .init();
            tracing::info!(
                otel_endpoint = endpoint,
                service_name,
                "OpenTelemetry tracing enabled"
            );
            Some(OtelGuard { provider })
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            tracing::warn!(
                otel_endpoint = endpoint,
                "OTLP exporter unavailable, tracing to stdout only: {}",
                e
            );
            None
        }
    }
}

/// Shuts the tracer provider down on drop.
pub struct OtelGuard {
    provider: opentelemetry_sdk::trace::SdkTracerProvider,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("Failed to shut down OTel tracer provider: {e:?}");
        }
    }
}

fn build_provider(
    endpoint: &str,
    service_name: &str,
) -> anyhow::Result<opentelemetry_sdk::trace::SdkTracerProvider> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::{SpanExporter, WithExportConfig};
    use opentelemetry_sdk::trace::{BatchSpanProcessor, SdkTracerProvider};
    use opentelemetry_sdk::Resource;

    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", service_name.to_owned()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_owned()),
        ])
        .build();

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_span_processor(BatchSpanProcessor::builder(exporter).build())
        .build())
}
