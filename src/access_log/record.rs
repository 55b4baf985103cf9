//! Access record construction.
//!
//! # Responsibilities
//! - Capture the request fields a log line needs
//! - Derive host, identity and request URI after redaction
//! - Apply `-` placeholders for absent username, referrer and user agent
//! - Hand exactly one record to the sink per request

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, HeaderName, Method, Request, Uri, Version};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::access_log::identity::{first_non_empty, resolve_username};
use crate::access_log::observer::{ResponseObserver, ResponseWriter};
use crate::access_log::redact::{redact_query, PASSWORD_PARAM};
use crate::access_log::sink::DiagnosticSink;

/// Placeholder for fields that were not present.
pub const PLACEHOLDER: &str = "-";

/// Tag attached to error records.
pub const ERROR_TAG: &str = "encountered error";

/// Default header carrying the request ID.
pub const REQUEST_ID_HEADER: &str = "request-id";

/// The moment a request started, as wall-clock time for display and as a
/// monotonic instant for latency.
#[derive(Debug, Clone, Copy)]
pub struct RequestStart {
    pub at: DateTime<Utc>,
    pub instant: Instant,
}

impl RequestStart {
    pub fn now() -> Self {
        Self {
            at: Utc::now(),
            instant: Instant::now(),
        }
    }
}

/// The parts of a request the access log reads.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    /// Peer address as `host:port`, or whatever the transport reported.
    pub remote_addr: String,
}

impl RequestSnapshot {
    /// Snapshot a request; the remote address comes from axum's
    /// `ConnectInfo` when the server was started with it.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let remote_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();

        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
            remote_addr,
        }
    }

    fn header(&self, name: impl header::AsHeaderName) -> String {
        self.headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default()
    }
}

/// One finished request, ready for a sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessRecord {
    pub host: String,
    pub user: String,
    pub start: DateTime<Utc>,
    pub method: String,
    pub uri: String,
    pub proto: String,
    pub status: u16,
    pub size: u64,
    pub referrer: String,
    pub user_agent: String,
    pub request_id: String,
    #[serde(rename = "elapsed_us", serialize_with = "serialize_micros")]
    pub elapsed: Duration,
}

fn serialize_micros<S: serde::Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(elapsed.as_micros() as u64)
}

/// Builds access records and emits them to a sink.
pub struct RecordBuilder {
    sink: Arc<dyn DiagnosticSink>,
    redact_params: Vec<String>,
    request_id_header: HeaderName,
}

impl RecordBuilder {
    /// Builder with the default redaction list and request-ID header.
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            sink,
            redact_params: vec![PASSWORD_PARAM.to_string()],
            request_id_header: HeaderName::from_static(REQUEST_ID_HEADER),
        }
    }

    /// Replace the list of redacted query parameters.
    pub fn with_redact_params(mut self, params: Vec<String>) -> Self {
        self.redact_params = params;
        self
    }

    /// Read the request ID from a different header.
    pub fn with_request_id_header(mut self, name: HeaderName) -> Self {
        self.request_id_header = name;
        self
    }

    /// Derive the record for a finished request.
    pub fn build<W: ResponseWriter>(
        &self,
        observer: &mut ResponseObserver<W>,
        request: &RequestSnapshot,
        start: RequestStart,
    ) -> AccessRecord {
        let uri = redact_query(&request.uri, &self.redact_params);
        let username = resolve_username(&uri, &request.headers);
        let host = split_host(&request.remote_addr);
        let referrer = request.header(header::REFERER);
        let user_agent = request.header(header::USER_AGENT);

        AccessRecord {
            host: host.to_string(),
            user: first_non_empty(&[username.as_str(), PLACEHOLDER]).to_string(),
            start: start.at,
            method: request.method.to_string(),
            uri: request_uri(&uri),
            proto: format!("{:?}", request.version),
            status: observer.status().as_u16(),
            size: observer.size(),
            referrer: first_non_empty(&[referrer.as_str(), PLACEHOLDER]).to_string(),
            user_agent: first_non_empty(&[user_agent.as_str(), PLACEHOLDER]).to_string(),
            request_id: request.header(&self.request_id_header),
            elapsed: start.instant.elapsed(),
        }
    }

    /// Emit the access record for a request that completed normally.
    pub fn log_access<W: ResponseWriter>(
        &self,
        observer: &mut ResponseObserver<W>,
        request: &RequestSnapshot,
        start: RequestStart,
    ) {
        let record = self.build(observer, request, start);
        self.sink.emit_access(&record);
    }

    /// Emit the error record for a request that failed with `detail`.
    pub fn log_error<W: ResponseWriter>(
        &self,
        observer: &mut ResponseObserver<W>,
        request: &RequestSnapshot,
        start: RequestStart,
        detail: &str,
    ) {
        let record = self.build(observer, request, start);
        self.sink.emit_error(ERROR_TAG, detail, &record);
    }
}

impl std::fmt::Debug for RecordBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordBuilder")
            .field("redact_params", &self.redact_params)
            .field("request_id_header", &self.request_id_header)
            .finish_non_exhaustive()
    }
}

/// Host part of `host:port`, or the whole address when it does not split.
pub fn split_host(remote_addr: &str) -> &str {
    split_host_port(remote_addr)
        .map(|(host, _)| host)
        .unwrap_or(remote_addr)
}

/// Split `host:port` or `[v6]:port`. Bare IPv6 addresses and addresses
/// without a port do not split.
fn split_host_port(addr: &str) -> Option<(&str, &str)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = tail.strip_prefix(':')?;
        return Some((host, port));
    }

    let (host, port) = addr.rsplit_once(':')?;
    if host.contains(':') || host.contains('[') || port.contains(']') {
        return None;
    }
    Some((host, port))
}

/// Path and query as sent on the request line, `/` for an empty path.
fn request_uri(uri: &Uri) -> String {
    let path = match uri.path() {
        "" => "/",
        p => p,
    };
    match uri.query() {
        Some(q) => format!("{path}?{q}"),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_log::observer::Flush;
    use axum::http::StatusCode;
    use std::io;
    use std::sync::Mutex;

    #[derive(Default)]
    struct NullWriter(HeaderMap);

    impl ResponseWriter for NullWriter {
        fn headers(&mut self) -> &mut HeaderMap {
            &mut self.0
        }

        fn write_header(&mut self, _status: StatusCode) {}

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flusher(&mut self) -> Option<&mut dyn Flush> {
            None
        }
    }

    #[derive(Debug, PartialEq)]
    enum Emitted {
        Access(AccessRecord),
        Error(String, String, AccessRecord),
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Emitted>>);

    impl DiagnosticSink for Recorder {
        fn emit_access(&self, record: &AccessRecord) {
            self.0.lock().unwrap().push(Emitted::Access(record.clone()));
        }

        fn emit_error(&self, tag: &str, detail: &str, record: &AccessRecord) {
            self.0
                .lock()
                .unwrap()
                .push(Emitted::Error(tag.into(), detail.into(), record.clone()));
        }
    }

    fn snapshot(uri: &str, remote_addr: &str) -> RequestSnapshot {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(())
            .unwrap();
        RequestSnapshot {
            remote_addr: remote_addr.to_string(),
            ..RequestSnapshot::from_request(&request)
        }
    }

    #[test]
    fn test_split_host() {
        assert_eq!(split_host("192.0.2.1:8080"), "192.0.2.1");
        assert_eq!(split_host("192.0.2.1"), "192.0.2.1");
        assert_eq!(split_host("[2001:db8::1]:443"), "2001:db8::1");
        assert_eq!(split_host("2001:db8::1"), "2001:db8::1");
        assert_eq!(split_host("localhost:80"), "localhost");
        assert_eq!(split_host(""), "");
    }

    #[test]
    fn test_request_uri() {
        assert_eq!(request_uri(&"http://h".parse().unwrap()), "/");
        assert_eq!(request_uri(&"/a/b?c=d".parse().unwrap()), "/a/b?c=d");
    }

    #[test]
    fn test_build_applies_placeholders() {
        let sink = Arc::new(Recorder::default());
        let builder = RecordBuilder::new(sink);
        let mut observer = ResponseObserver::new(NullWriter::default());

        let record = builder.build(&mut observer, &snapshot("/", "192.0.2.1"), RequestStart::now());

        assert_eq!(record.host, "192.0.2.1");
        assert_eq!(record.user, "-");
        assert_eq!(record.referrer, "-");
        assert_eq!(record.user_agent, "-");
        assert_eq!(record.request_id, "");
        assert_eq!(record.status, 200);
        assert_eq!(record.size, 0);
        assert_eq!(record.method, "GET");
        assert_eq!(record.proto, "HTTP/1.1");
    }

    #[test]
    fn test_build_reads_redacted_uri_and_headers() {
        let sink = Arc::new(Recorder::default());
        let builder = RecordBuilder::new(sink);
        let mut observer = ResponseObserver::new(NullWriter::default());
        observer.write_header(StatusCode::NOT_FOUND);
        observer.write(b"gone").unwrap();

        let mut request = snapshot("/path?p=secret123&u=alice", "192.0.2.1:8080");
        request.headers.insert(header::REFERER, "http://ref.example/".parse().unwrap());
        request.headers.insert(header::USER_AGENT, "curl/8.0".parse().unwrap());
        request.headers.insert("request-id", "abc-123".parse().unwrap());

        let record = builder.build(&mut observer, &request, RequestStart::now());

        assert_eq!(record.uri, "/path?p=%5BREDACTED%5D&u=alice");
        assert!(!record.uri.contains("secret123"));
        assert_eq!(record.user, "alice");
        assert_eq!(record.host, "192.0.2.1");
        assert_eq!(record.status, 404);
        assert_eq!(record.size, 4);
        assert_eq!(record.referrer, "http://ref.example/");
        assert_eq!(record.user_agent, "curl/8.0");
        assert_eq!(record.request_id, "abc-123");
        // The snapshot itself is never rewritten
        assert!(request.uri.to_string().contains("secret123"));
    }

    #[test]
    fn test_custom_request_id_header() {
        let builder = RecordBuilder::new(Arc::new(Recorder::default()))
            .with_request_id_header(HeaderName::from_static("x-request-id"));
        let mut observer = ResponseObserver::new(NullWriter::default());
        let mut request = snapshot("/", "");
        request.headers.insert("x-request-id", "r-1".parse().unwrap());

        let record = builder.build(&mut observer, &request, RequestStart::now());
        assert_eq!(record.request_id, "r-1");
    }

    #[test]
    fn test_exactly_one_emission() {
        let sink = Arc::new(Recorder::default());
        let builder = RecordBuilder::new(sink.clone());
        let request = snapshot("/ok", "10.0.0.1:1");

        let mut observer = ResponseObserver::new(NullWriter::default());
        builder.log_access(&mut observer, &request, RequestStart::now());
        assert_eq!(sink.0.lock().unwrap().len(), 1);
        assert!(matches!(sink.0.lock().unwrap()[0], Emitted::Access(_)));

        let mut observer = ResponseObserver::new(NullWriter::default());
        observer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        builder.log_error(&mut observer, &request, RequestStart::now(), "boom");

        let emitted = sink.0.lock().unwrap();
        assert_eq!(emitted.len(), 2);
        match &emitted[1] {
            Emitted::Error(tag, detail, record) => {
                assert_eq!(tag, ERROR_TAG);
                assert_eq!(detail, "boom");
                assert_eq!(record.status, 500);
            }
            other => panic!("expected error record, got {other:?}"),
        }
    }

    #[test]
    fn test_record_serializes_elapsed_micros() {
        let record = AccessRecord {
            host: "h".into(),
            user: "-".into(),
            start: DateTime::from_timestamp(0, 0).unwrap(),
            method: "GET".into(),
            uri: "/".into(),
            proto: "HTTP/1.1".into(),
            status: 200,
            size: 0,
            referrer: "-".into(),
            user_agent: "-".into(),
            request_id: String::new(),
            elapsed: Duration::from_millis(3),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["elapsed_us"], 3000);
        assert_eq!(json["start"], "1970-01-01T00:00:00Z");
    }
}
