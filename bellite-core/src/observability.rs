//! Logging and OpenTelemetry setup
//!
//! Library code only emits `tracing` events; nothing is printed unless the
//! application installs a subscriber. [`init_observability`] installs one:
//!
//! - an `EnvFilter` built from `RUST_LOG`, falling back to the configured level
//! - a JSON `fmt` layer on stdout
//! - optionally, an OpenTelemetry layer exporting spans over OTLP/gRPC
//! - optionally, a global meter provider so `ClientMetrics` reach a collector
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log filter (e.g. "info", "bellite_client=debug")
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: collector endpoint
//!
//! ```rust,no_run
//! use bellite_core::ObservabilityConfig;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let config = ObservabilityConfig::new("my-desktop-app")
//!         .with_traces(false)
//!         .with_log_level("debug");
//!     bellite_core::init_observability(config).expect("observability");
//!
//!     // ... drive the client ...
//!
//!     bellite_core::shutdown_observability();
//! }
//! ```

use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{SdkTracerProvider, Tracer};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How often metrics are pushed to the collector
const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Observability configuration
///
/// Defaults: service name "bellite", crate version, endpoint from
/// `OTEL_EXPORTER_OTLP_ENDPOINT` (or `http://localhost:4317`), traces and
/// metrics enabled, log level from `RUST_LOG` (or "info").
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Reported as `service.name`
    pub service_name: String,
    /// Reported as `service.version`
    pub service_version: String,
    /// OTLP gRPC collector endpoint
    pub otlp_endpoint: String,
    /// Export spans
    pub enable_traces: bool,
    /// Install a global meter provider
    pub enable_metrics: bool,
    /// Emit the local JSON log stream
    pub enable_logs: bool,
    /// Fallback filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "bellite".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            enable_traces: true,
            enable_metrics: true,
            enable_logs: true,
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl ObservabilityConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    pub fn with_traces(mut self, enable: bool) -> Self {
        self.enable_traces = enable;
        self
    }

    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    pub fn with_logs(mut self, enable: bool) -> Self {
        self.enable_logs = enable;
        self
    }

    fn resource(&self) -> opentelemetry_sdk::Resource {
        opentelemetry_sdk::Resource::builder_empty()
            .with_attributes(vec![
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                    self.service_name.clone(),
                ),
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                    self.service_version.clone(),
                ),
            ])
            .build()
    }
}

/// SDK providers installed by [`init_observability`]
///
/// The global registry only hands out trait objects, so the concrete
/// providers are kept here until [`shutdown_observability`] flushes them.
#[derive(Default)]
struct Providers {
    tracer: Option<SdkTracerProvider>,
    meter: Option<SdkMeterProvider>,
}

static PROVIDERS: Mutex<Option<Providers>> = Mutex::new(None);

fn installed() -> MutexGuard<'static, Option<Providers>> {
    PROVIDERS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Install the tracing subscriber and, if enabled, the OpenTelemetry providers
///
/// Call once per process. A second call fails because a global subscriber is
/// already set.
///
/// Exporters are built with tonic, so when traces or metrics are enabled this
/// must run inside a tokio runtime.
pub fn init_observability(
    config: ObservabilityConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut providers = Providers::default();

    let tracer = if config.enable_traces {
        let provider = tracer_provider(&config)?;
        // The tracing layer needs a tracer before the provider goes global
        let tracer = provider.tracer(config.service_name.clone());
        global::set_tracer_provider(provider.clone());
        providers.tracer = Some(provider);
        Some(tracer)
    } else {
        None
    };

    if config.enable_metrics {
        let provider = meter_provider(&config)?;
        global::set_meter_provider(provider.clone());
        providers.meter = Some(provider);
    }

    register(providers);
    install_subscriber(&config, tracer)?;

    tracing::info!(
        service_name = %config.service_name,
        otlp_endpoint = %config.otlp_endpoint,
        traces = config.enable_traces,
        metrics = config.enable_metrics,
        logs = config.enable_logs,
        "Observability initialized"
    );

    Ok(())
}

fn register(providers: Providers) {
    if providers.tracer.is_some() || providers.meter.is_some() {
        *installed() = Some(providers);
    }
}

fn tracer_provider(
    config: &ObservabilityConfig,
) -> Result<SdkTracerProvider, Box<dyn std::error::Error + Send + Sync>> {
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(config.resource())
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .build())
}

fn meter_provider(
    config: &ObservabilityConfig,
) -> Result<SdkMeterProvider, Box<dyn std::error::Error + Send + Sync>> {
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(METRICS_EXPORT_INTERVAL)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(config.resource())
        .build())
}

fn install_subscriber(
    config: &ObservabilityConfig,
    tracer: Option<Tracer>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let fmt_layer = config.enable_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .json()
    });
    let telemetry_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Flush and release the OpenTelemetry providers
///
/// Pending spans are exported and the metric reader does a final collection.
/// Returns whether there was anything to shut down; later calls are no-ops.
pub fn shutdown_observability() -> bool {
    let Some(providers) = installed().take() else {
        return false;
    };

    if let Some(tracer) = providers.tracer {
        if let Err(error) = tracer.shutdown() {
            tracing::warn!(error = %error, "Tracer provider shutdown failed");
        }
    }
    if let Some(meter) = providers.meter {
        if let Err(error) = meter.shutdown() {
            tracing::warn!(error = %error, "Meter provider shutdown failed");
        }
    }
    tracing::info!("Observability shut down");
    true
}
