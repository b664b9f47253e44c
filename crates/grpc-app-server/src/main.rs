use clap::Parser;
use grpc_app_server::server::config::{CliArgs, ServerConfig};
use grpc_app_server::server::serve;
use grpc_app_server::server::service::handler::EchoService;
use grpc_app_server::server::telemetry::{TelemetryProviders, init_telemetry};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let (providers, recorder) = init_telemetry(&config)?;
    let service = EchoService::new(config.clone(), recorder);

    if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            let incoming = UnixListenerStream::new(uds);
            tracing::info!("Starting text service on {}", uds_path);
            let res = serve(service, incoming, shutdown_signal()).await;
            // TODO: Best effort to clean up the socket file although a panic
            // might leave it behind.
            let _ = std::fs::remove_file(&uds_path);
            flush_telemetry(providers);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp = TcpListener::bind(&config.server_addr).await?;
        let incoming = TcpListenerStream::new(tcp);
        tracing::info!("Starting text service on {}", config.server_addr);
        let res = serve(service, incoming, shutdown_signal()).await;
        flush_telemetry(providers);
        res
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}

fn flush_telemetry(providers: TelemetryProviders) {
    if let Err(err) = providers.tracer_provider.force_flush() {
        eprintln!("Error flushing traces: {err:#?}");
    }
    if let Err(err) = providers.tracer_provider.shutdown() {
        eprintln!("Error shutting down tracer: {err:#?}");
    }
}
