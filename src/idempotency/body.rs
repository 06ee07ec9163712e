//! Response body that records what it streams.
//!
//! Frames reach the client as soon as the wrapped body yields them. A copy
//! of the data is kept aside and, once the stream is known to be complete,
//! handed to the [`IdempotencyHandler`] on a background task. A body that
//! errors, exceeds the size cap, or is dropped early is never cached.

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body::{Body as HttpBody, Frame, SizeHint};
use pin_project::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::idempotency::fingerprint::Fingerprint;
use crate::idempotency::handler::IdempotencyHandler;
use crate::idempotency::record::CachedResponse;
use crate::idempotency::storage::LockToken;

/// Captured state for one in-flight response.
pub struct Capture {
    handler: Arc<IdempotencyHandler>,
    fingerprint: Fingerprint,
    status: StatusCode,
    headers: HeaderMap,
    buffer: BytesMut,
    lock: Option<LockToken>,
    done: bool,
}

impl Capture {
    pub fn new(
        handler: Arc<IdempotencyHandler>,
        fingerprint: Fingerprint,
        status: StatusCode,
        headers: HeaderMap,
        lock: Option<LockToken>,
    ) -> Self {
        Self {
            handler,
            fingerprint,
            status,
            headers,
            buffer: BytesMut::new(),
            lock,
            done: false,
        }
    }

    /// Appends a chunk. Returns false once the body outgrows the size cap.
    fn push(&mut self, chunk: &[u8]) -> bool {
        if self.buffer.len() + chunk.len() > self.handler.max_cacheable_body_bytes() {
            return false;
        }
        self.buffer.extend_from_slice(chunk);
        true
    }

    /// Stores the complete response in the background.
    pub fn finish(mut self) {
        self.done = true;
        let record = CachedResponse::new(
            self.status,
            &self.headers,
            std::mem::take(&mut self.buffer).freeze(),
        );
        let handler = Arc::clone(&self.handler);
        let fingerprint = self.fingerprint.clone();
        let lock = self.lock.take();

        spawn(async move {
            handler.store(&fingerprint, record).await;
            if let Some(token) = lock {
                handler.release(&fingerprint, &token).await;
            }
        });
    }

    /// Gives up on caching this response.
    pub fn abandon(mut self, reason: &str) {
        self.handler.record_skipped(&self.fingerprint, reason);
        self.done = true;
        self.release_lock();
    }

    fn release_lock(&mut self) {
        let Some(token) = self.lock.take() else {
            return;
        };
        let handler = Arc::clone(&self.handler);
        let fingerprint = self.fingerprint.clone();
        spawn(async move { handler.release(&fingerprint, &token).await });
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!(fingerprint = %self.fingerprint, "Response dropped before completion, not cached");
            self.release_lock();
        }
    }
}

fn spawn<F>(future: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(future);
        }
        Err(_) => tracing::warn!("No async runtime available, idempotency cache update skipped"),
    }
}

/// Body wrapper forwarding every frame unchanged while feeding a [`Capture`].
#[pin_project]
pub struct CaptureBody<B> {
    #[pin]
    inner: B,
    capture: Option<Capture>,
}

impl<B> CaptureBody<B>
where
    B: HttpBody<Data = Bytes>,
{
    pub fn new(inner: B, capture: Capture) -> Self {
        // Servers may never poll a body that is already complete.
        if inner.is_end_stream() {
            capture.finish();
            return Self {
                inner,
                capture: None,
            };
        }

        Self {
            inner,
            capture: Some(capture),
        }
    }
}

impl<B> HttpBody for CaptureBody<B>
where
    B: HttpBody<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        match this.inner.as_mut().poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    let within_limit = this
                        .capture
                        .as_mut()
                        .map(|capture| capture.push(data))
                        .unwrap_or(true);
                    if !within_limit {
                        if let Some(capture) = this.capture.take() {
                            capture.abandon("response body exceeds cacheable size");
                        }
                    }
                }
                // The final data frame may be the last poll a server makes.
                if this.inner.is_end_stream() {
                    if let Some(capture) = this.capture.take() {
                        capture.finish();
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                if let Some(capture) = this.capture.take() {
                    capture.abandon("response body failed while streaming");
                }
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let Some(capture) = this.capture.take() {
                    capture.finish();
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
