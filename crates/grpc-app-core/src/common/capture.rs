//! In-memory capture sinks for tests.
//!
//! These stand in for the process-wide log sink and trace exporter so the
//! instrumented call lifecycle can be asserted without a real telemetry
//! backend. Appends are atomic (mutex-guarded) and the accessors return
//! snapshots, so concurrent calls can write while a test reads.

use crate::observe::{FinishedSpan, LogLevel, LogRecord, LogSink, SpanSink};
use std::sync::Mutex;

/// Append-only buffer of [`LogRecord`]s.
#[derive(Default)]
pub struct MemoryLogSink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogSink {
    /// Snapshot of all records appended so far, in append order.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Whether a record with the given level and exact message was appended.
    pub fn has_record(&self, level: LogLevel, message: &str) -> bool {
        self.records()
            .iter()
            .any(|r| r.level == level && r.message == message)
    }
}

impl LogSink for MemoryLogSink {
    fn append(&self, record: LogRecord) {
        // A poisoned mutex means a test already panicked; drop the record
        // rather than propagate.
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

/// Append-only buffer of [`FinishedSpan`]s.
#[derive(Default)]
pub struct MemorySpanSink {
    spans: Mutex<Vec<FinishedSpan>>,
}

impl MemorySpanSink {
    /// Snapshot of all exported spans, in export order.
    pub fn spans(&self) -> Vec<FinishedSpan> {
        self.spans.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// The first exported span with the given name, if any.
    pub fn span(&self, name: &str) -> Option<FinishedSpan> {
        self.spans().into_iter().find(|s| s.name == name)
    }

    /// Whether a span with the given name was exported.
    pub fn has_span(&self, name: &str) -> bool {
        self.span(name).is_some()
    }
}

impl SpanSink for MemorySpanSink {
    fn export(&self, span: FinishedSpan) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::{Recorder, SpanStatus};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_appends_are_all_retained() {
        let logs = Arc::new(MemoryLogSink::default());
        let spans = Arc::new(MemorySpanSink::default());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let recorder = Recorder::new(logs.clone(), spans.clone());
                thread::spawn(move || {
                    let mut span = recorder.start_span(format!("call-{i}"));
                    for j in 0..16 {
                        recorder.record_unit(&mut span, &format!("{i}-{j}"));
                    }
                    span.end();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(logs.records().len(), 8 * 16);
        assert_eq!(spans.spans().len(), 8);

        // Ordering holds within each call's span even under concurrency.
        for span in spans.spans() {
            assert_eq!(span.status, SpanStatus::Ok);
            let prefix = span.name.trim_start_matches("call-");
            for (j, event) in span.events.iter().enumerate() {
                assert_eq!(event.name, format!("received: {prefix}-{j}"));
            }
        }
    }

    #[test]
    fn span_lookup_finds_by_name() {
        let spans = MemorySpanSink::default();
        assert!(!spans.has_span("ExampleUnary"));

        spans.export(FinishedSpan {
            name: "ExampleUnary".to_string(),
            events: Vec::new(),
            status: SpanStatus::Ok,
            started_at: std::time::SystemTime::now(),
            ended_at: std::time::SystemTime::now(),
        });

        assert!(spans.has_span("ExampleUnary"));
        assert!(spans.span("ExampleStreaming").is_none());
    }
}
