//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use httpd_access_log::config::ShimConfig;
use httpd_access_log::http::HttpServer;
use httpd_access_log::{AccessRecord, DiagnosticSink};

/// What a sink received.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Emitted {
    Access(AccessRecord),
    Error {
        tag: String,
        detail: String,
        record: AccessRecord,
    },
}

/// Sink that keeps every record it is handed.
#[derive(Default)]
pub struct RecordingSink {
    emitted: Mutex<Vec<Emitted>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn emitted(&self) -> Vec<Emitted> {
        self.emitted.lock().unwrap().clone()
    }

    /// The single access record, panicking if anything else was emitted.
    pub fn only_access(&self) -> AccessRecord {
        let emitted = self.emitted();
        assert_eq!(emitted.len(), 1, "expected exactly one emission: {emitted:?}");
        match &emitted[0] {
            Emitted::Access(record) => record.clone(),
            other => panic!("expected access record, got {other:?}"),
        }
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit_access(&self, record: &AccessRecord) {
        self.emitted.lock().unwrap().push(Emitted::Access(record.clone()));
    }

    fn emit_error(&self, tag: &str, detail: &str, record: &AccessRecord) {
        self.emitted.lock().unwrap().push(Emitted::Error {
            tag: tag.to_string(),
            detail: detail.to_string(),
            record: record.clone(),
        });
    }
}

/// Server wired to a fresh recording sink.
pub fn recorded_server(config: ShimConfig) -> (HttpServer, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let server = HttpServer::with_sink(config, sink.clone());
    (server, sink)
}

/// A GET request arriving from `peer`.
#[allow(dead_code)]
pub fn request_from(uri: &str, peer: &str) -> Request<Body> {
    let mut request = Request::get(uri).body(Body::empty()).unwrap();
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}
