//! Response observation.
//!
//! # Responsibilities
//! - Proxy the response-writing surface without altering the bytes sent
//! - Record the status code, defaulting to 200 on the first body write
//! - Count the bytes the underlying writer accepted
//!
//! # Design Decisions
//! - Flush is an optional capability queried at call time
//! - `write_header` always overwrites the recorded status; protocol misuse
//!   (a header after body bytes) is left to the caller

use std::io;

use axum::http::{HeaderMap, StatusCode};

/// Error type for response observation.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The wrapped writer cannot flush.
    #[error("underlying response writer does not support flushing")]
    FlushUnsupported,

    #[error("flush failed: {0}")]
    Io(#[from] io::Error),
}

/// Flush capability of a response writer.
pub trait Flush {
    fn flush(&mut self) -> io::Result<()>;
}

/// The response-writing surface a handler writes through.
pub trait ResponseWriter {
    /// Mutable access to the response headers.
    fn headers(&mut self) -> &mut HeaderMap;

    /// Send the status line.
    fn write_header(&mut self, status: StatusCode);

    /// Write body bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Returns the flush capability, if this writer has one.
    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        None
    }
}

/// Wraps a [`ResponseWriter`] and tracks the status and size of the response.
#[derive(Debug)]
pub struct ResponseObserver<W> {
    inner: W,
    status: Option<StatusCode>,
    size: u64,
}

impl<W: ResponseWriter> ResponseObserver<W> {
    /// Start observing a response.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            status: None,
            size: 0,
        }
    }

    /// Pass-through to the underlying headers.
    pub fn headers(&mut self) -> &mut HeaderMap {
        self.inner.headers()
    }

    /// Flush the underlying writer.
    ///
    /// Fails with [`ObserverError::FlushUnsupported`] when the wrapped writer
    /// has no flush capability.
    pub fn flush(&mut self) -> Result<(), ObserverError> {
        let flusher = self.inner.flusher().ok_or(ObserverError::FlushUnsupported)?;
        flusher.flush()?;
        Ok(())
    }

    /// Write body bytes through to the underlying writer.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            // Body without an explicit status implies success
            self.status = Some(StatusCode::OK);
        }
        let result = self.inner.write(buf);
        if let Ok(written) = result {
            self.size += written as u64;
        }
        result
    }

    /// Send the status line and record it.
    pub fn write_header(&mut self, status: StatusCode) {
        self.inner.write_header(status);
        self.status = Some(status);
    }

    /// The recorded status, 200 if nothing was ever written.
    pub fn status(&mut self) -> StatusCode {
        *self.status.get_or_insert(StatusCode::OK)
    }

    /// Total body bytes written so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: ResponseWriter> ResponseWriter for ResponseObserver<W> {
    fn headers(&mut self) -> &mut HeaderMap {
        ResponseObserver::headers(self)
    }

    fn write_header(&mut self, status: StatusCode) {
        ResponseObserver::write_header(self, status)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ResponseObserver::write(self, buf)
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        if self.inner.flusher().is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl<W: ResponseWriter> Flush for ResponseObserver<W> {
    fn flush(&mut self) -> io::Result<()> {
        ResponseObserver::flush(self).map_err(|e| match e {
            ObserverError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::Unsupported, other),
        })
    }
}
