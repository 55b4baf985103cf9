//! Access-log middleware.
//!
//! # Responsibilities
//! - Snapshot the request and fix the start time before the handler runs
//! - Recover handler panics into a 500 and an error record
//! - Stream the response body through a `ResponseObserver`
//! - Emit exactly one record when the body ends, fails or is dropped
//!
//! # Design Decisions
//! - The body keeps its size hint so framing (content-length) is unchanged
//! - Emission happens at most once: the pending record is taken on first use

use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::BytesMut;
use futures_util::FutureExt;
use hyper::body::{Body as HttpBody, Frame, SizeHint};

use crate::access_log::{
    Flush, RecordBuilder, RequestSnapshot, RequestStart, ResponseObserver, ResponseWriter,
};

/// Writer that hands each written chunk on as the next body frame.
///
/// Each chunk is copied once into a reused buffer; `take_frame` splits it
/// off without a second copy.
#[derive(Debug, Default)]
pub struct FrameWriter {
    headers: HeaderMap,
    pending: BytesMut,
}

impl FrameWriter {
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            headers,
            ..Default::default()
        }
    }

    /// Take the bytes written since the last frame.
    pub fn take_frame(&mut self) -> Bytes {
        self.pending.split().freeze()
    }
}

impl ResponseWriter for FrameWriter {
    fn headers(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, _status: StatusCode) {
        // The status line travels in the response parts.
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }
}

impl Flush for FrameWriter {
    fn flush(&mut self) -> io::Result<()> {
        // Frames leave on every poll; nothing is held back.
        Ok(())
    }
}

/// A record waiting for its response to finish.
struct PendingRecord {
    builder: Arc<RecordBuilder>,
    request: RequestSnapshot,
    start: RequestStart,
    observer: ResponseObserver<FrameWriter>,
    failure: Option<String>,
}

impl PendingRecord {
    fn emit(mut self) {
        match self.failure.take() {
            Some(detail) => {
                self.builder
                    .log_error(&mut self.observer, &self.request, self.start, &detail)
            }
            None => self
                .builder
                .log_access(&mut self.observer, &self.request, self.start),
        }
    }
}

/// Response body that counts bytes through the observer and logs on completion.
pub struct ObservedBody {
    inner: Body,
    pending: Option<PendingRecord>,
}

impl ObservedBody {
    fn finish(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.emit();
        }
    }
}

impl HttpBody for ObservedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                let frame = match frame.into_data() {
                    Ok(data) => match this.pending.as_mut() {
                        Some(pending) => match pending.observer.write(&data) {
                            Ok(_) => Frame::data(pending.observer.get_mut().take_frame()),
                            Err(e) => {
                                pending.failure = Some(e.to_string());
                                this.finish();
                                return Poll::Ready(Some(Err(axum::Error::new(e))));
                            }
                        },
                        None => Frame::data(data),
                    },
                    // Trailers pass through untouched
                    Err(frame) => frame,
                };
                if this.inner.is_end_stream() {
                    this.finish();
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(err)) => {
                if let Some(pending) = this.pending.as_mut() {
                    pending.failure = Some(err.to_string());
                }
                this.finish();
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.finish();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for ObservedBody {
    fn drop(&mut self) {
        // Covers empty bodies that are never polled and aborted responses.
        self.finish();
    }
}

/// Middleware emitting one access record per request.
///
/// Install with `axum::middleware::from_fn_with_state(builder, access_log_middleware)`.
pub async fn access_log_middleware(
    State(builder): State<Arc<RecordBuilder>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = RequestStart::now();
    let snapshot = RequestSnapshot::from_request(&request);

    let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let detail = panic_message(panic.as_ref());
            // The error record below is the one log line for this request
            tracing::debug!(
                method = %snapshot.method,
                path = %snapshot.uri.path(),
                "Handler panicked"
            );

            let mut observer = ResponseObserver::new(FrameWriter::default());
            observer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
            builder.log_error(&mut observer, &snapshot, start, &detail);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let (mut parts, body) = response.into_parts();
    let mut observer = ResponseObserver::new(FrameWriter::new(std::mem::take(&mut parts.headers)));
    observer.write_header(parts.status);
    parts.headers = std::mem::take(observer.headers());

    let observed = ObservedBody {
        inner: body,
        pending: Some(PendingRecord {
            builder,
            request: snapshot,
            start,
            observer,
            failure: None,
        }),
    };

    Response::from_parts(parts, Body::new(observed))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
