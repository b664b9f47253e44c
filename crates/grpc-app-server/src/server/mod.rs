//! gRPC server assembly and lifecycle.
//!
//! ## Structure
//!
//! - [`config`] - CLI/env-driven runtime configuration.
//! - [`service`] - client-facing handlers (`EchoService`) and the response
//!   text rule.
//! - [`streaming`] - the per-stream session state machine.
//! - [`telemetry`] - logging/tracing wiring and the production sinks behind
//!   the recorder.

pub mod config;
pub mod service;
pub mod streaming;
pub mod telemetry;

use crate::server::service::handler::EchoService;
use futures::Stream;
use grpc_app_core::proto::FILE_DESCRIPTOR_SET;
use grpc_app_core::proto::example_service_server::ExampleServiceServer;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite};
use tonic::codec::CompressionEncoding;
use tonic::transport::Server;
use tonic::transport::server::Connected;
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;

/// Serves the text service over `incoming` until `signal` resolves.
///
/// Alongside [`EchoService`], the router carries the gRPC health service and
/// server reflection. When `signal` fires, health flips to NOT_SERVING,
/// in-flight streams get a grace period to finish, and stragglers are
/// cancelled before the transport winds down.
pub async fn serve<I, IO, IE, F>(service: EchoService, incoming: I, signal: F) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
    F: Future<Output = ()>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<ExampleServiceServer<EchoService>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    Server::builder()
        .http2_adaptive_window(Some(true))
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_example_service(service.clone()))
        .serve_with_incoming_shutdown(incoming, drain_on(signal, service, health_reporter))
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn build_example_service(service: EchoService) -> ExampleServiceServer<EchoService> {
    ExampleServiceServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

async fn drain_on<F>(signal: F, service: EchoService, health_reporter: HealthReporter)
where
    F: Future<Output = ()>,
{
    signal.await;

    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    health_reporter
        .set_not_serving::<ExampleServiceServer<EchoService>>()
        .await;

    // 2. Drain in-flight streams, then cancel whatever is left
    service.shutdown().await;
}
