//! gRPC service implementation for the text exchange service.
//!
//! This module defines [`EchoService`], the concrete implementation of the
//! [`ExampleService`] gRPC service defined in the protobuf specification. It
//! exposes a unary endpoint and a bidirectional streaming endpoint, both
//! instrumented through the injected [`Recorder`].
//!
//! ## Responsibilities
//!
//! - Open one span per RPC invocation, named after the method.
//! - Record every inbound unit (one log record, one span event) before
//!   answering it.
//! - Spawn one session task per streaming call; calls never block each other.
//! - Refuse new calls while draining and support graceful shutdown.

use crate::server::{config::ServerConfig, streaming::session::StreamSession};
use core::pin::Pin;
use core::time::Duration;
use grpc_app_core::{
    Error,
    observe::Recorder,
    proto::{ExampleRequest, ExampleResponse, example_service_server::ExampleService},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

use super::transform::transform;

/// Instrumented text exchange service.
///
/// Holds no cross-call mutable state beyond the in-flight stream gauge; the
/// shared log and span sinks live behind the [`Recorder`] and tolerate
/// concurrent appends from simultaneous calls.
#[derive(Clone)]
pub struct EchoService {
    config: ServerConfig,
    recorder: Recorder,
    draining: Arc<AtomicBool>,
    shutdown_token: CancellationToken,
    streams_inflight: Arc<AtomicUsize>,
}

impl EchoService {
    pub fn new(config: ServerConfig, recorder: Recorder) -> Self {
        Self {
            config,
            recorder,
            draining: Arc::new(AtomicBool::new(false)),
            shutdown_token: CancellationToken::new(),
            streams_inflight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of streaming calls currently in flight.
    pub fn streams_inflight(&self) -> usize {
        self.streams_inflight.load(Ordering::SeqCst)
    }

    /// Initiates a graceful shutdown.
    ///
    /// New calls are refused immediately. In-flight streams get the
    /// configured grace period to finish; whatever remains afterwards is
    /// cancelled through the shared token, which every session observes at
    /// its suspension points.
    pub async fn shutdown(&self) {
        // === Phase 1: Stop accepting new requests ===
        tracing::info!("Refusing new requests");
        self.draining.store(true, Ordering::SeqCst);

        // === Phase 2: Wait for in-flight streams to drain ===
        tracing::info!(
            "Draining in-flight streams ({} active)",
            self.streams_inflight()
        );
        let drained = timeout(Duration::from_secs(self.config.shutdown_grace_secs), async {
            while self.streams_inflight() > 0 {
                sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => {
                tracing::debug!("All in-flight streams drained successfully");
            }
            Err(_) => {
                tracing::warn!(
                    "Graceful drain timed out ({} streams still active)",
                    self.streams_inflight()
                );
            }
        }

        // === Phase 3: Cancel any remaining work ===
        self.shutdown_token.cancel();
    }

    fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }
}

#[tonic::async_trait]
impl ExampleService for EchoService {
    /// Handles a single request/response exchange.
    ///
    /// Opens a span named after the call, records the unit, computes the
    /// response synchronously, and closes the span before returning.
    async fn example_unary(
        &self,
        request: Request<ExampleRequest>,
    ) -> Result<Response<ExampleResponse>, Status> {
        if self.is_draining() {
            return Err(Error::ServiceShutdown.into());
        }

        let text = request.into_inner().text;

        let mut span = self.recorder.start_span("ExampleUnary");
        self.recorder.record_unit(&mut span, &text);
        let reply = ExampleResponse {
            text: transform(&text),
        };
        span.end();

        Ok(Response::new(reply))
    }

    type ExampleStreamingStream = Pin<Box<dyn Stream<Item = Result<ExampleResponse, Status>> + Send>>;

    /// Handles a bidirectional streaming exchange.
    ///
    /// Spawns one [`StreamSession`] per call so streams proceed
    /// independently; within a session, processing stays strictly sequential.
    async fn example_streaming(
        &self,
        request: Request<Streaming<ExampleRequest>>,
    ) -> Result<Response<Self::ExampleStreamingStream>, Status> {
        if self.is_draining() {
            return Err(Error::ServiceShutdown.into());
        }

        let inbound = request.into_inner();
        let (resp_tx, resp_rx) = mpsc::channel(self.config.stream_buffer_size);

        let mut session =
            StreamSession::new(self.recorder.clone(), self.shutdown_token.child_token());

        let inflight = Arc::clone(&self.streams_inflight);
        inflight.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            if let Err(e) = session.run(inbound, resp_tx).await {
                tracing::warn!("Stream terminated: {e}");
            }
            inflight.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(resp_rx))))
    }
}
