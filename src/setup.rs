use std::sync::Arc;

use opentelemetry::{
    global,
    logs::LogError,
    metrics::{noop::NoopMeterProvider, MetricsError},
    KeyValue,
};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{logs::Config, propagation::TraceContextPropagator, runtime, Resource};
use tracing_core::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::{
    config::TelemetryConfig,
    error::Error,
    telemetry::{TelemetryClient, TracingTelemetryClient},
};

/// Sets up tracing, metrics and logging via otlp exporter, as described by
/// `config` (see [`TelemetryConfig::from_env`]).
///
/// This should generally be the first statement of any server binary's main
/// function, and must run inside a tokio runtime.
pub fn setup(config: &TelemetryConfig) -> Result<(), Error> {
    init_metrics(config)?;
    // needs to run before init_tracer
    init_logs(config)?;
    init_tracer(config)?;

    tracing::info!(
        service = %config.service_name,
        endpoint = %config.endpoint,
        "starting server"
    );
    Ok(())
}

/// Creates the process-wide telemetry client.
///
/// Returns `None` when telemetry is disabled or cannot be set up. Requests
/// then run without correlation contexts. Pipelines installed before the
/// failing step are torn down again.
///
/// # Panics
///
/// Like [`setup`], this panics instead of returning `None` when called
/// outside a tokio runtime.
pub fn create_client(config: &TelemetryConfig) -> Option<Arc<dyn TelemetryClient>> {
    if config.disabled {
        return None;
    }

    match setup(config) {
        Ok(()) => Some(Arc::new(TracingTelemetryClient)),
        Err(error) => {
            teardown();
            tracing::warn!(%error, "telemetry unavailable, requests will not be correlated");
            None
        }
    }
}

fn service_resource(config: &TelemetryConfig) -> Resource {
    Resource::new(vec![KeyValue::new(
        opentelemetry_semantic_conventions::resource::SERVICE_NAME,
        config.service_name.clone(),
    )])
}

fn init_tracer(config: &TelemetryConfig) -> Result<(), Error> {
    global::set_text_map_propagator(TraceContextPropagator::new());
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(config.endpoint.clone()),
        )
        .with_trace_config(
            opentelemetry_sdk::trace::config().with_resource(service_resource(config)),
        )
        .install_batch(runtime::Tokio)?;

    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
    let log_layer = OpenTelemetryTracingBridge::new(&global::logger_provider());
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy()
        }))
        .with(telemetry)
        .with(log_layer)
        .try_init()?;

    Ok(())
}

fn init_metrics(config: &TelemetryConfig) -> Result<(), MetricsError> {
    let _meter = opentelemetry_otlp::new_pipeline()
        .metrics(runtime::Tokio)
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(config.endpoint.clone()),
        )
        .with_resource(service_resource(config))
        .build()?;

    Ok(())
}

fn init_logs(config: &TelemetryConfig) -> Result<(), LogError> {
    opentelemetry_otlp::new_pipeline()
        .logging()
        .with_log_config(Config::default().with_resource(service_resource(config)))
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(config.endpoint.clone()),
        )
        .install_batch(runtime::Tokio)?;

    Ok(())
}

/// Flushes and shuts down the exporters installed by [`setup`].
pub fn teardown() {
    global::shutdown_logger_provider();
    global::shutdown_tracer_provider();
    // dropping the last handle shuts the sdk meter provider down
    global::set_meter_provider(NoopMeterProvider::new());
}
