//! HTTP API Module
//!
//! Serves this instance's tables to peers over the sync protocol.

mod http;

pub use http::{HealthResponse, HttpServer, SyncInfoResponse};
