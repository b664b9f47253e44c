//! Observability contract threaded through every RPC call.
//!
//! The service records two correlated signals for each inbound unit of work: a
//! structured [`LogRecord`] appended to a process-wide log sink, and a
//! [`SpanEvent`] appended to the span covering the call. Both carry the same
//! name (`"received: <text>"`) so either source can be cross-checked against
//! the other in tests.
//!
//! Sinks are injected collaborators, not ambient globals: handlers receive a
//! [`Recorder`] at construction and pass an explicit [`SpanHandle`] to every
//! instrumentation call. Production wires the recorder to `tracing` and an
//! OpenTelemetry tracer; tests wire it to the in-memory buffers in
//! [`crate::capture`].
//!
//! Sink operations are infallible by contract. An implementation that hits an
//! internal error must swallow it: an observability outage never surfaces as
//! an RPC failure.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

/// Severity of a [`LogRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// A single structured log record. Append-only once produced.
#[derive(Clone, Debug)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl LogRecord {
    /// An info-level record with no attributes.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            message: message.into(),
            attributes: BTreeMap::new(),
        }
    }
}

/// A timestamped marker attached to a span, in receipt order.
#[derive(Clone, Debug)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: SystemTime,
}

/// Terminal status of a span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    Error { message: String },
}

/// A closed span, as handed to a [`SpanSink`]. One per RPC invocation.
#[derive(Clone, Debug)]
pub struct FinishedSpan {
    pub name: String,
    pub events: Vec<SpanEvent>,
    pub status: SpanStatus,
    pub started_at: SystemTime,
    pub ended_at: SystemTime,
}

/// Process-wide log sink. Appends must be atomic with respect to each other;
/// no ordering is guaranteed across distinct calls.
pub trait LogSink: Send + Sync {
    fn append(&self, record: LogRecord);
}

/// Process-wide exporter for closed spans.
pub trait SpanSink: Send + Sync {
    fn export(&self, span: FinishedSpan);
}

/// Instrumentation adapter handed to every handler at construction.
///
/// `start_span` opens one span per RPC invocation; `record_unit` emits the
/// log record and span event for one received unit. Calls on the same span
/// are side-effect-ordered, so the event sequence matches receipt order.
#[derive(Clone)]
pub struct Recorder {
    logs: Arc<dyn LogSink>,
    spans: Arc<dyn SpanSink>,
}

impl Recorder {
    pub fn new(logs: Arc<dyn LogSink>, spans: Arc<dyn SpanSink>) -> Self {
        Self { logs, spans }
    }

    /// Begins a span scoped to one RPC call, named after the RPC method.
    ///
    /// The returned handle must be closed via [`SpanHandle::end`] or
    /// [`SpanHandle::end_with_error`] when the call finishes. If the handle is
    /// dropped without either (an early return or panic), the span is still
    /// exported, with error status, so spans are never leaked.
    pub fn start_span(&self, name: impl Into<String>) -> SpanHandle {
        SpanHandle {
            name: name.into(),
            events: Vec::new(),
            started_at: SystemTime::now(),
            sink: Arc::clone(&self.spans),
            exported: false,
        }
    }

    /// Records one received unit: exactly one log record and exactly one span
    /// event, both named `"received: <text>"`.
    pub fn record_unit(&self, span: &mut SpanHandle, text: &str) {
        let name = format!("received: {text}");
        self.logs.append(LogRecord::info(name.clone()));
        span.add_event(name);
    }
}

/// Handle to the span covering one in-flight RPC call.
///
/// Owned by the handler and passed explicitly to every instrumentation call;
/// there is no ambient "current span".
pub struct SpanHandle {
    name: String,
    events: Vec<SpanEvent>,
    started_at: SystemTime,
    sink: Arc<dyn SpanSink>,
    exported: bool,
}

impl SpanHandle {
    fn add_event(&mut self, name: String) {
        self.events.push(SpanEvent {
            name,
            timestamp: SystemTime::now(),
        });
    }

    /// Closes the span with [`SpanStatus::Ok`] and exports it.
    pub fn end(mut self) {
        self.finish(SpanStatus::Ok);
    }

    /// Closes the span with [`SpanStatus::Error`] and exports it.
    pub fn end_with_error(mut self, message: impl Into<String>) {
        self.finish(SpanStatus::Error {
            message: message.into(),
        });
    }

    fn finish(&mut self, status: SpanStatus) {
        if self.exported {
            return;
        }
        self.exported = true;

        self.sink.export(FinishedSpan {
            name: std::mem::take(&mut self.name),
            events: std::mem::take(&mut self.events),
            status,
            started_at: self.started_at,
            ended_at: SystemTime::now(),
        });
    }
}

impl Drop for SpanHandle {
    fn drop(&mut self) {
        if !self.exported {
            self.finish(SpanStatus::Error {
                message: "span dropped before completion".to_string(),
            });
        }
    }
}
