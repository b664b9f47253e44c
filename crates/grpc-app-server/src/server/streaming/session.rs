//! State machine for one bidirectional stream session.
//!
//! A [`StreamSession`] owns exactly one span and lives for the lifetime of one
//! streaming call. Processing is strictly sequential per stream: the response
//! for unit *N* is written before unit *N+1* is read, which is what
//! guarantees response ordering. The two suspension points (reading the next
//! unit and writing a response) both race against the session's cancellation
//! token, so a cancelled call releases its span instead of leaking it.

use crate::server::service::transform::transform;
use grpc_app_core::observe::Recorder;
use grpc_app_core::proto::{ExampleRequest, ExampleResponse};
use grpc_app_core::{Error, Result};
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Lifecycle of one stream session.
///
/// `Open` awaits the next unit or the close signal; `Processing` covers
/// instrumenting and transforming a received unit and writing its response.
/// Exactly one of the terminal states is reached per call, after which no
/// further events or logs are attached to the session's span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Processing,
    Closing,
    Closed,
    Errored,
}

/// Drives one streaming call from acceptance to its terminal state.
pub struct StreamSession {
    recorder: Recorder,
    cancel: CancellationToken,
    state: SessionState,
}

impl StreamSession {
    pub fn new(recorder: Recorder, cancel: CancellationToken) -> Self {
        Self {
            recorder,
            cancel,
            state: SessionState::Open,
        }
    }

    /// Terminal state inspection, for callers that outlive the run loop.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session until the peer half-closes, the transport fails, or
    /// the call is cancelled.
    ///
    /// Every received unit is recorded (one log record, one span event),
    /// transformed, and answered before the next read. On end-of-input the
    /// span closes with ok status and the response stream completes; on read
    /// or write failure the span closes with error status and the failure
    /// becomes the stream's terminal error.
    pub async fn run<S>(
        &mut self,
        mut inbound: S,
        resp_tx: mpsc::Sender<std::result::Result<ExampleResponse, Status>>,
    ) -> Result<()>
    where
        S: Stream<Item = std::result::Result<ExampleRequest, Status>> + Unpin,
    {
        debug_assert_eq!(self.state, SessionState::Open);
        let cancel = self.cancel.clone();
        let mut span = self.recorder.start_span("ExampleStreaming");

        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => {
                    self.state = SessionState::Errored;
                    span.end_with_error("request cancelled");
                    return Err(Error::RequestCancelled);
                }
                next = inbound.next() => next,
            };

            match next {
                Some(Ok(unit)) => {
                    self.state = SessionState::Processing;
                    self.recorder.record_unit(&mut span, &unit.text);
                    let reply = ExampleResponse {
                        text: transform(&unit.text),
                    };

                    // The response must be written before the next read.
                    tokio::select! {
                        () = cancel.cancelled() => {
                            self.state = SessionState::Errored;
                            span.end_with_error("request cancelled");
                            return Err(Error::RequestCancelled);
                        }
                        sent = resp_tx.send(Ok(reply)) => {
                            if sent.is_err() {
                                let err = Error::ChannelError {
                                    context: "response stream closed by peer".to_string(),
                                };
                                self.state = SessionState::Errored;
                                span.end_with_error(err.to_string());
                                return Err(err);
                            }
                        }
                    }

                    self.state = SessionState::Open;
                }
                Some(Err(status)) => {
                    let err = Error::Transport { source: status };
                    self.state = SessionState::Errored;
                    span.end_with_error(err.to_string());

                    // Best effort to surface the failure to the peer; it may
                    // already be gone.
                    if let Err(e) = resp_tx.send(Err(err.clone().into())).await {
                        tracing::warn!("Failed to forward stream error: {e}");
                    }
                    return Err(err);
                }
                None => {
                    self.state = SessionState::Closing;
                    span.end();
                    self.state = SessionState::Closed;
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use grpc_app_core::capture::{MemoryLogSink, MemorySpanSink};
    use grpc_app_core::observe::{LogLevel, SpanStatus};
    use std::sync::Arc;

    fn recorder() -> (Recorder, Arc<MemoryLogSink>, Arc<MemorySpanSink>) {
        let logs = Arc::new(MemoryLogSink::default());
        let spans = Arc::new(MemorySpanSink::default());
        let recorder = Recorder::new(logs.clone(), spans.clone());
        (recorder, logs, spans)
    }

    fn unit(text: &str) -> std::result::Result<ExampleRequest, Status> {
        Ok(ExampleRequest {
            text: text.to_string(),
        })
    }

    #[tokio::test]
    async fn responds_in_arrival_order_then_closes() {
        let (recorder, logs, spans) = recorder();
        let mut session = StreamSession::new(recorder, CancellationToken::new());

        let inbound = tokio_stream::iter(vec![unit("this"), unit("is"), unit("a"), unit("test")]);
        let (tx, mut rx) = mpsc::channel(8);

        session.run(inbound, tx).await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);

        let mut responses = Vec::new();
        while let Some(item) = rx.recv().await {
            responses.push(item.unwrap().text);
        }
        assert_eq!(
            responses,
            vec![
                "response from grpc-app: you sent this",
                "response from grpc-app: you sent is",
                "response from grpc-app: you sent a",
                "response from grpc-app: you sent test",
            ]
        );

        for text in ["this", "is", "a", "test"] {
            assert!(logs.has_record(LogLevel::Info, &format!("received: {text}")));
        }
        assert_eq!(logs.records().len(), 4);

        let span = spans.span("ExampleStreaming").unwrap();
        assert_eq!(span.status, SpanStatus::Ok);
        let events: Vec<_> = span.events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            events,
            ["received: this", "received: is", "received: a", "received: test"]
        );
    }

    #[tokio::test]
    async fn empty_stream_closes_cleanly_with_no_output() {
        let (recorder, logs, spans) = recorder();
        let mut session = StreamSession::new(recorder, CancellationToken::new());

        let inbound = tokio_stream::iter(Vec::<std::result::Result<ExampleRequest, Status>>::new());
        let (tx, mut rx) = mpsc::channel(8);

        session.run(inbound, tx).await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);

        assert!(rx.recv().await.is_none());
        assert!(logs.records().is_empty());

        let span = spans.span("ExampleStreaming").unwrap();
        assert_eq!(span.status, SpanStatus::Ok);
        assert!(span.events.is_empty());
    }

    #[tokio::test]
    async fn read_failure_terminates_with_the_original_status() {
        let (recorder, logs, spans) = recorder();
        let mut session = StreamSession::new(recorder, CancellationToken::new());

        let inbound =
            tokio_stream::iter(vec![unit("a"), Err(Status::unavailable("link down"))]);
        let (tx, mut rx) = mpsc::channel(8);

        let err = session.run(inbound, tx).await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
        assert_eq!(session.state(), SessionState::Errored);

        // The unit received before the failure was answered and stays valid.
        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.text, "response from grpc-app: you sent a");

        // The failure is surfaced as the stream's terminal error.
        let last = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(last.code(), tonic::Code::Unavailable);
        assert!(rx.recv().await.is_none());

        assert_eq!(logs.records().len(), 1);
        let span = spans.span("ExampleStreaming").unwrap();
        assert!(matches!(span.status, SpanStatus::Error { .. }));
        assert_eq!(span.events.len(), 1);
    }

    #[tokio::test]
    async fn write_failure_stops_the_session() {
        let (recorder, logs, spans) = recorder();
        let mut session = StreamSession::new(recorder, CancellationToken::new());

        let inbound = tokio_stream::iter(vec![unit("orphan")]);
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        let err = session.run(inbound, tx).await.unwrap_err();
        assert!(matches!(err, Error::ChannelError { .. }));
        assert_eq!(session.state(), SessionState::Errored);

        // The unit was recorded before the write failed.
        assert_eq!(logs.records().len(), 1);
        let span = spans.span("ExampleStreaming").unwrap();
        assert!(matches!(span.status, SpanStatus::Error { .. }));
        assert_eq!(span.events.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_at_the_read_point_releases_the_span() {
        let (recorder, logs, spans) = recorder();
        let cancel = CancellationToken::new();
        let mut session = StreamSession::new(recorder, cancel.clone());

        let inbound = tokio_stream::pending::<std::result::Result<ExampleRequest, Status>>();
        let (tx, _rx) = mpsc::channel(8);

        let run = tokio::spawn(async move {
            let result = session.run(inbound, tx).await;
            (session.state(), result)
        });

        cancel.cancel();

        let (state, result) = run.await.unwrap();
        assert_eq!(state, SessionState::Errored);
        assert!(matches!(result, Err(Error::RequestCancelled)));
        assert!(logs.records().is_empty());

        let span = spans.span("ExampleStreaming").unwrap();
        assert!(matches!(span.status, SpanStatus::Error { .. }));
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_blocked_write() {
        let (recorder, _logs, spans) = recorder();
        let cancel = CancellationToken::new();
        let mut session = StreamSession::new(recorder, cancel.clone());

        // Capacity 1 and an undrained receiver: the second response blocks.
        let inbound = tokio_stream::iter(vec![unit("one"), unit("two")]);
        let (tx, _rx) = mpsc::channel(1);

        let run = tokio::spawn(async move {
            let result = session.run(inbound, tx).await;
            (session.state(), result)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let (state, result) = run.await.unwrap();
        assert_eq!(state, SessionState::Errored);
        assert!(matches!(result, Err(Error::RequestCancelled)));

        let span = spans.span("ExampleStreaming").unwrap();
        assert!(matches!(span.status, SpanStatus::Error { .. }));
    }
}
