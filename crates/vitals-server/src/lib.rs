//! Metrics ingestion server.
//!
//! The HTTP surface is an axum router behind a middleware chain (trusted
//! subnet, decryption, gzip, body integrity); the gRPC surface is a tonic
//! service. Both dispatch into the transport-agnostic [`ingest::Ingest`]
//! core, which validates metrics and applies them to a pluggable
//! [`vitals_storage::Storage`]. The [`dumper::Dumper`] sidecar restores
//! state at boot and snapshots it to disk.

pub mod api;
pub mod app;
pub mod config;
pub mod dumper;
pub mod grpc;
pub mod ingest;
pub mod middleware;
pub mod state;
