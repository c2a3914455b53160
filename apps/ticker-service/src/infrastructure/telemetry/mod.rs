//! Tracing Setup
//!
//! Console logging through `tracing-subscriber`. Spans are also exported
//! over OTLP when `OTEL_ENABLED=true`.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log filter (default: `ticker_service=info`)
//! - `OTEL_ENABLED`: Export spans (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: Collector address (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Resource name on exported spans (default: ticker-service)

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const SERVICE_NAME: &str = "ticker-service";
const COLLECTOR: &str = "http://localhost:4317";
const FALLBACK_FILTER: &str = "ticker_service=info,tokio_tungstenite=warn,tungstenite=warn";

/// Flushes exported spans when dropped. Hold it until the process exits.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are being exported.
    #[must_use]
    pub const fn exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let Some(provider) = self.provider.take() else {
            return;
        };
        if let Err(e) = provider.shutdown() {
            eprintln!("span export did not shut down cleanly: {e}");
        }
    }
}

/// Where and whether to export spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Export spans over OTLP.
    pub export_spans: bool,
    /// Collector address.
    pub collector: String,
    /// Resource name attached to spans.
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            export_spans: false,
            collector: COLLECTOR.to_string(),
            service_name: SERVICE_NAME.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Read `OTEL_*` variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            export_spans: lookup("OTEL_ENABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")),
            collector: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or(defaults.collector),
            service_name: lookup("OTEL_SERVICE_NAME").unwrap_or(defaults.service_name),
        }
    }
}

/// Install the global subscriber using [`TelemetryConfig::from_env`].
#[must_use]
pub fn init() -> TelemetryGuard {
    init_with_config(TelemetryConfig::from_env())
}

/// Install the global subscriber.
///
/// An unreachable or misconfigured collector degrades to console-only
/// logging.
#[must_use]
pub fn init_with_config(config: TelemetryConfig) -> TelemetryGuard {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER));
    let console = tracing_subscriber::fmt::layer().with_target(true);

    let provider = config.export_spans.then(|| span_provider(&config)).flatten();
    let spans = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(spans)
        .init();

    TelemetryGuard { provider }
}

fn span_provider(config: &TelemetryConfig) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.collector)
        .build()
        .inspect_err(|e| eprintln!("OTLP export disabled: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build(),
    )
}
