//! Error types for the text exchange service.
//!
//! This module defines the central `Error` enum, which captures the terminal
//! failure cases of a call. It implements `From<Error>` for `tonic::Status` to
//! enable seamless gRPC error propagation to clients with appropriate status
//! codes and messages.
//!
//! ## Error Cases
//! - `Transport`: reading the inbound request stream failed.
//! - `ChannelError`: the response channel closed before a unit could be
//!   written (the peer went away mid-stream).
//! - `RequestCancelled`: the call context was cancelled at a suspension point.
//! - `ServiceShutdown`: a request arrived while the service was draining.
//!
//! Graceful end-of-input on a stream is not an error and has no variant here.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the text exchange service.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// Reading from the inbound request stream failed.
    #[error("Transport error: {source}")]
    Transport { source: Status },

    /// The response channel closed before a unit could be written.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The call context was cancelled.
    #[error("Request cancelled")]
    RequestCancelled,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Transport { source } => source,
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {context}"))
            }
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
