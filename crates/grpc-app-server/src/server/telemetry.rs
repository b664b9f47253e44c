//! Telemetry wiring and production observability sinks.
//!
//! Console logging always goes through `tracing_subscriber::fmt` with an
//! `EnvFilter`. Span export goes through an OpenTelemetry tracer provider;
//! the stdout span exporter is attached when the config asks for it,
//! otherwise finished spans are dropped at the provider.
//!
//! The returned [`Recorder`] is backed by two production sinks:
//!
//! - [`TracingLogSink`] forwards log records to the `tracing` subscriber
//!   stack.
//! - [`OtelSpanSink`] rebuilds each finished span on an OpenTelemetry tracer
//!   with its original timestamps, events, and status.
//!
//! Both sinks are infallible by contract; telemetry backends failing must
//! never surface as RPC errors.

use crate::server::config::ServerConfig;
use grpc_app_core::observe::{
    FinishedSpan, LogLevel, LogRecord, LogSink, Recorder, SpanSink, SpanStatus,
};
use opentelemetry::trace::{Span, Status as OtelStatus, Tracer, TracerProvider};
use opentelemetry::{InstrumentationScope, KeyValue, global};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace as sdktrace;
use opentelemetry_semantic_conventions as semvcns;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub struct TelemetryProviders {
    pub tracer_provider: sdktrace::SdkTracerProvider,
}

/// Installs the global tracing subscriber and tracer provider, and builds the
/// [`Recorder`] handed to the service.
///
/// Must be called once, at startup; the subscriber registry cannot be
/// installed twice.
pub fn init_telemetry(config: &ServerConfig) -> anyhow::Result<(TelemetryProviders, Recorder)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let tracer_provider = init_tracer(config);

    let scope = InstrumentationScope::builder("grpc-app")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Standard tracing logs printed to the console via
    // `tracing_subscriber::fmt`. This is unrelated to the OpenTelemetry span
    // export - it logs events as human-readable output.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        )
        .init();

    global::set_tracer_provider(tracer_provider.clone());
    let tracer = global::tracer_provider().tracer_with_scope(scope);

    let recorder = Recorder::new(Arc::new(TracingLogSink), Arc::new(OtelSpanSink::new(tracer)));

    Ok((TelemetryProviders { tracer_provider }, recorder))
}

fn resource() -> Resource {
    Resource::builder()
        .with_service_name("grpc-app")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

fn init_tracer(config: &ServerConfig) -> sdktrace::SdkTracerProvider {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    let builder = if config.otel_stdout {
        let exporter = opentelemetry_stdout::SpanExporter::default();
        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(core::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    } else {
        builder
    };

    builder.build()
}

/// Forwards log records to the `tracing` subscriber stack.
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn append(&self, record: LogRecord) {
        match record.level {
            LogLevel::Info => {
                tracing::info!(attributes = ?record.attributes, "{}", record.message);
            }
            LogLevel::Warn => {
                tracing::warn!(attributes = ?record.attributes, "{}", record.message);
            }
            LogLevel::Error => {
                tracing::error!(attributes = ?record.attributes, "{}", record.message);
            }
        }
    }
}

/// Exports finished spans to an OpenTelemetry tracer.
///
/// The span is rebuilt from the handle's recorded data: original start and
/// end timestamps, events in receipt order, and terminal status.
pub struct OtelSpanSink {
    tracer: global::BoxedTracer,
}

impl OtelSpanSink {
    pub fn new(tracer: global::BoxedTracer) -> Self {
        Self { tracer }
    }
}

impl SpanSink for OtelSpanSink {
    fn export(&self, span: FinishedSpan) {
        let events = span
            .events
            .into_iter()
            .map(|e| opentelemetry::trace::Event::new(e.name, e.timestamp, Vec::new(), 0))
            .collect::<Vec<_>>();

        let status = match span.status {
            SpanStatus::Ok => OtelStatus::Ok,
            SpanStatus::Error { message } => OtelStatus::error(message),
        };

        let mut exported = self
            .tracer
            .span_builder(span.name)
            .with_start_time(span.started_at)
            .with_events(events)
            .with_status(status)
            .start(&self.tracer);
        exported.end_with_timestamp(span.ended_at);
    }
}
