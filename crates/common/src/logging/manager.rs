//! Logging initialization and shutdown.

use std::{io, sync::OnceLock};

use opentelemetry::{
    global::{self, set_text_map_propagator},
    trace::{TraceError, TracerProvider},
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    runtime::Tokio,
    trace::{Config, TracerProvider as SdkTracerProvider},
};
use thiserror::Error;
use tracing::*;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{
    filter::{EnvFilter, ParseError},
    fmt::{format::FmtSpan, layer, MakeWriter},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    Layer, Registry,
};

use super::types::{LogFormat, LoggerConfig, OtlpExport, ServiceIdentity};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Held so [`finalize`] can flush pending spans.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("invalid filter directive: {0}")]
    Filter(#[from] ParseError),

    #[error("otlp pipeline: {0}")]
    Otlp(#[from] TraceError),

    #[error("subscriber already set: {0}")]
    Subscriber(#[from] TryInitError),
}

/// INFO unless `RUST_LOG` says otherwise. sled is noisy below WARN.
fn env_filter() -> Result<EnvFilter, ParseError> {
    Ok(EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy()
        .add_directive("sled=warn".parse()?))
}

fn fmt_layer<W>(
    format: LogFormat,
    writer: W,
    ansi: bool,
    span_events: FmtSpan,
    filter: EnvFilter,
) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_span_events(span_events);
    match format {
        LogFormat::Json => base.json().with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_filter(filter).boxed(),
    }
}

fn otlp_layer(
    export: &OtlpExport,
    identity: &ServiceIdentity,
) -> Result<BoxedLayer, LoggingInitError> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&export.endpoint)
        .with_timeout(export.timeout);

    let provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(Config::default().with_resource(identity.resource()))
        .install_batch(Tokio)?;

    if TRACER_PROVIDER.set(provider.clone()).is_err() {
        warn!("tracer provider already set, keeping the first one");
    }

    let tracer = provider.tracer("taskledger");
    Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
}

/// Installs the global subscriber.
///
/// Stdout is reserved for command output, so the console layer writes to
/// stderr. File and OTLP layers are added when configured. Must run inside
/// a tokio runtime when OTLP export is enabled.
pub fn init(config: LoggerConfig) -> Result<(), LoggingInitError> {
    set_text_map_propagator(TraceContextPropagator::new());

    let mut layers = vec![fmt_layer(
        config.stdout_format,
        io::stderr,
        true,
        config.span_events.clone(),
        env_filter()?,
    )];

    if let Some(file) = &config.file {
        let appender = RollingFileAppender::new(
            file.rotation.clone(),
            &file.directory,
            &file.file_name_prefix,
        );
        layers.push(fmt_layer(
            file.format,
            appender,
            false,
            FmtSpan::NONE,
            env_filter()?,
        ));
    }

    if let Some(export) = &config.otlp {
        layers.push(otlp_layer(export, &config.identity)?);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    info!(
        service = %config.identity.name,
        version = ?config.identity.version,
        signer = ?config.identity.signer,
        otlp = config.otlp.is_some(),
        "logging initialized"
    );

    Ok(())
}

/// Flushes pending spans and tears down the tracer provider.
pub fn finalize() {
    match TRACER_PROVIDER.get() {
        Some(provider) => {
            if let Err(e) = provider.shutdown() {
                error!(err = ?e, "tracer provider shutdown failed");
            }
        }
        None => debug!("no tracer provider to shut down"),
    }

    global::shutdown_tracer_provider();
}
