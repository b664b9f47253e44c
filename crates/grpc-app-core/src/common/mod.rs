pub mod capture;
mod error;
pub mod observe;

pub use error::*;

/// Generated protobuf/tonic bindings for the `grpc_app` package.
pub mod proto {
    tonic::include_proto!("grpc_app");

    /// Encoded file descriptor set, consumed by the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("grpc_app_descriptor");
}
