//! Builds the gRPC client and server code for the `grpc_app.proto` definition
//! using `tonic-prost-build`.
//!
//! The code generation step processes the Protocol Buffer definition located
//! in the `proto` directory and emits Rust modules with gRPC bindings into the
//! crate's `OUT_DIR`. A file descriptor set is written alongside the bindings
//! so the server can register a reflection service.
//!
//! Generated code is accessible in Rust via:
//!
//! ```text
//! pub mod proto {
//!     tonic::include_proto!("grpc_app");
//! }
//! ```

use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("grpc_app_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/grpc_app.proto"], &["proto"])
        .unwrap();
}
