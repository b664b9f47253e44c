use anyhow::bail;
use clap::Parser;

/// Runtime configuration for the `grpc-app-server` binary.
///
/// All values are parsed from CLI arguments or environment variables, with
/// reasonable defaults suitable for production. A `.env` file is honored at
/// startup.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "grpc-app-server",
    version,
    about = "An instrumented gRPC service for exchanging text"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/grpc-app.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Capacity of the response buffer between a stream session and the gRPC
    /// transport.
    ///
    /// This affects how many responses can be buffered before the session
    /// must wait for the client to consume more data. Lower values increase
    /// backpressure responsiveness; higher values enable deeper pipelining.
    /// Processing within a stream stays strictly sequential either way.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight streams to finish during graceful
    /// shutdown before cancelling them.
    ///
    /// Environment variable: `SHUTDOWN_GRACE_SECS`
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace_secs: u64,

    /// Export finished spans to stdout via the OpenTelemetry stdout exporter.
    ///
    /// Environment variable: `OTEL_STDOUT`
    #[arg(long, env = "OTEL_STDOUT", default_value_t = false)]
    pub otel_stdout: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub stream_buffer_size: usize,
    pub shutdown_grace_secs: u64,
    pub otel_stdout: bool,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            stream_buffer_size: args.stream_buffer_size,
            shutdown_grace_secs: args.shutdown_grace_secs,
            otel_stdout: args.otel_stdout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_a_valid_config() {
        let args = CliArgs::parse_from(["grpc-app-server"]);
        let config = ServerConfig::try_from(args).unwrap();
        assert_eq!(config.stream_buffer_size, 8);
        assert!(!config.uds);
    }

    #[test]
    fn zero_stream_buffer_is_rejected() {
        let args = CliArgs::parse_from(["grpc-app-server", "--stream-buffer-size", "0"]);
        assert!(ServerConfig::try_from(args).is_err());
    }
}
