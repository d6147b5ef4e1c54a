// packages/engine/src/interception/capture_body.rs
//! Response body wrapper that forwards frames and keeps a copy
//!
//! Every frame from the transport is handed to the caller exactly as it was
//! produced: same bytes, same chunk boundaries, same order. Data frames are
//! additionally appended to a per-exchange buffer. The exchange completes
//! on the terminal event:
//!
//! ```text
//! data frame ──► buffer + forward        (end of stream reached?) ──► complete
//! None       ──► complete (success)
//! Err        ──► fail, error forwarded unchanged
//! deadline   ──► fail, timeout error forwarded
//! dropped    ──► cancelled, nothing published, request body deleted
//! ```

use crate::interception::http_interceptor::Interceptor;
use crate::recording::exchange::{ExchangeId, ExchangeRecord, ResponseData};
use crate::utils::errors::{BoxError, EngineError};
use bytes::{Bytes, BytesMut};
use hyper::body::{Body, Frame, SizeHint};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep};
use tracing::debug;

/// Exchange between Started and its terminal event
///
/// Dropping it without [`complete`](Self::complete) or [`fail`](Self::fail)
/// means the exchange was cancelled: nothing is published and the request
/// body stored at Started is deleted again.
pub(crate) struct PendingExchange {
    record: Option<ExchangeRecord>,
    interceptor: Arc<Interceptor>,
}

impl PendingExchange {
    pub(crate) fn new(record: ExchangeRecord, interceptor: Arc<Interceptor>) -> Self {
        Self {
            record: Some(record),
            interceptor,
        }
    }

    pub(crate) fn id(&self) -> Option<&ExchangeId> {
        self.record.as_ref().map(|record| &record.id)
    }

    pub(crate) fn complete(mut self, response: ResponseData, body: &[u8]) {
        if let Some(record) = self.record.take() {
            self.interceptor.complete(record, response, body);
        }
    }

    pub(crate) fn fail(mut self) {
        if let Some(record) = self.record.take() {
            self.interceptor.fail(record);
        }
    }
}

impl Drop for PendingExchange {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            self.interceptor.discard(&record);
        }
    }
}

/// Scratch state owned by one exchange once headers arrived
pub(crate) struct ExchangeCapture {
    pending: PendingExchange,
    response: ResponseData,
    buffer: BytesMut,
    deadline: Option<Pin<Box<Sleep>>>,
    timeout: Duration,
}

impl ExchangeCapture {
    pub(crate) fn new(
        pending: PendingExchange,
        response: ResponseData,
        deadline: Option<Instant>,
        timeout: Duration,
    ) -> Self {
        Self {
            pending,
            response,
            buffer: BytesMut::new(),
            deadline: deadline.map(|at| Box::pin(tokio::time::sleep_until(at))),
            timeout,
        }
    }

    pub(crate) fn complete(self) {
        self.pending.complete(self.response, &self.buffer);
    }

    fn fail(self) {
        self.pending.fail();
    }
}

/// Response body handed back to the caller
pub struct CaptureBody<B> {
    inner: Pin<Box<B>>,
    capture: Option<ExchangeCapture>,
}

impl<B> CaptureBody<B> {
    /// Forward without observing
    pub fn passthrough(inner: B) -> Self {
        Self {
            inner: Box::pin(inner),
            capture: None,
        }
    }

    pub(crate) fn capturing(inner: B, capture: ExchangeCapture) -> Self {
        Self {
            inner: Box::pin(inner),
            capture: Some(capture),
        }
    }

    /// `true` while the exchange is still waiting for its terminal event
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }
}

impl<B> fmt::Debug for CaptureBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureBody")
            .field("capturing", &self.is_capturing())
            .finish_non_exhaustive()
    }
}

impl<B> Body for CaptureBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        let expired = match this.capture.as_mut().and_then(|c| c.deadline.as_mut()) {
            Some(deadline) => deadline.as_mut().poll(cx).is_ready(),
            None => false,
        };
        if expired {
            if let Some(capture) = this.capture.take() {
                let timeout = capture.timeout;
                capture.fail();
                return Poll::Ready(Some(Err(EngineError::Timeout(timeout).into())));
            }
        }

        match this.inner.as_mut().poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(capture) = this.capture.as_mut() {
                    if let Some(data) = frame.data_ref() {
                        capture.buffer.extend_from_slice(data);
                    }
                }
                if this.inner.is_end_stream() {
                    if let Some(capture) = this.capture.take() {
                        capture.complete();
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                if let Some(capture) = this.capture.take() {
                    capture.fail();
                }
                Poll::Ready(Some(Err(e.into())))
            }
            Poll::Ready(None) => {
                if let Some(capture) = this.capture.take() {
                    capture.complete();
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for CaptureBody<B> {
    fn drop(&mut self) {
        if let Some(capture) = self.capture.take() {
            if let Some(id) = capture.pending.id() {
                debug!(
                    "Exchange {} cancelled after {} bytes, not recorded",
                    id,
                    capture.buffer.len()
                );
            }
        }
    }
}
