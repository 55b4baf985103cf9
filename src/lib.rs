//! HTTP access logging.
//!
//! Observes every response's status and byte count, then emits one
//! common-log-format record per request with the password parameter
//! redacted and the caller identity resolved.

pub mod access_log;
pub mod config;
pub mod http;

pub use access_log::{AccessRecord, DiagnosticSink, RecordBuilder, ResponseObserver, TracingSink};
pub use config::ShimConfig;
pub use http::HttpServer;
