//! Diagnostic sinks for finished records.
//!
//! # Design Decisions
//! - Emission is fire-and-forget; sinks report nothing back
//! - Sinks must be `Send + Sync`, any serialization is their own business
//! - The default sink writes through `tracing` on the `access_log` target

use serde::{Deserialize, Serialize};

use crate::access_log::record::AccessRecord;

/// Consumer of finished access records.
pub trait DiagnosticSink: Send + Sync {
    /// A request that completed normally.
    fn emit_access(&self, record: &AccessRecord);

    /// A request that failed; `tag` is fixed, `detail` describes the failure.
    fn emit_error(&self, tag: &str, detail: &str, record: &AccessRecord);
}

/// Rendering of the log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Common log format plus referrer, user agent, request ID and latency.
    #[default]
    Common,
    /// The record as a JSON object.
    Json,
}

/// Sink emitting records as `tracing` events.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    format: LogFormat,
}

impl TracingSink {
    pub fn new(format: LogFormat) -> Self {
        Self { format }
    }

    fn render(&self, record: &AccessRecord) -> String {
        match self.format {
            LogFormat::Common => common_log_line(record),
            LogFormat::Json => serde_json::to_string(record).unwrap_or_default(),
        }
    }
}

impl DiagnosticSink for TracingSink {
    fn emit_access(&self, record: &AccessRecord) {
        tracing::info!(
            target: "access_log",
            host = %record.host,
            method = %record.method,
            status = record.status,
            size = record.size,
            request_id = %record.request_id,
            elapsed_us = record.elapsed.as_micros() as u64,
            "{}",
            self.render(record)
        );
    }

    fn emit_error(&self, tag: &str, detail: &str, record: &AccessRecord) {
        let line = match self.format {
            LogFormat::Common => format!("{tag}: {detail} {}", common_log_line(record)),
            LogFormat::Json => serde_json::json!({
                "tag": tag,
                "detail": detail,
                "record": record,
            })
            .to_string(),
        };

        tracing::error!(
            target: "access_log",
            tag,
            detail,
            host = %record.host,
            method = %record.method,
            status = record.status,
            request_id = %record.request_id,
            "{}",
            line
        );
    }
}

/// Render a record as
/// `%h %l %u %t "%r" %>s %b "%{Referer}i" "%{User-agent}i" %{Request-Id}i %D`,
/// with the latency in microseconds.
pub fn common_log_line(record: &AccessRecord) -> String {
    format!(
        "{} - {} [{}] \"{} {} {}\" {} {} \"{}\" \"{}\" {} {}",
        record.host,
        record.user,
        record.start.format("%d/%b/%Y:%H:%M:%S %z"),
        record.method,
        record.uri,
        record.proto,
        record.status,
        record.size,
        record.referrer,
        record.user_agent,
        record.request_id,
        record.elapsed.as_micros(),
    )
}
