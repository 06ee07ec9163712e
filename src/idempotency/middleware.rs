use axum::body::Body;
use axum::response::IntoResponse;
use axum::BoxError;
use bytes::Bytes;
use http::{Request, Response};
use http_body::Body as HttpBody;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::error::AppError;
use crate::idempotency::body::{Capture, CaptureBody};
use crate::idempotency::fingerprint::Fingerprint;
use crate::idempotency::handler::IdempotencyHandler;
use crate::idempotency::record::CachedResponse;

/// Tower layer replaying responses for repeated idempotent requests.
#[derive(Clone)]
pub struct IdempotencyLayer {
    handler: Arc<IdempotencyHandler>,
}

impl IdempotencyLayer {
    pub fn new(handler: Arc<IdempotencyHandler>) -> Self {
        Self { handler }
    }
}

impl<S> Layer<S> for IdempotencyLayer {
    type Service = IdempotencyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IdempotencyService {
            inner,
            handler: Arc::clone(&self.handler),
        }
    }
}

#[derive(Clone)]
pub struct IdempotencyService<S> {
    inner: S,
    handler: Arc<IdempotencyHandler>,
}

impl<S, ResBody> Service<Request<Body>> for IdempotencyService<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // Use the service that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let handler = Arc::clone(&self.handler);

        Box::pin(intercept(handler, inner, request))
    }
}

/// fingerprint → lookup → replay or forward → capture → store
async fn intercept<S, ResBody>(
    handler: Arc<IdempotencyHandler>,
    mut inner: S,
    request: Request<Body>,
) -> Result<Response<Body>, S::Error>
where
    S: Service<Request<Body>, Response = Response<ResBody>>,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    let Some(idempotency_key) = handler.idempotency_key(&request) else {
        return inner.call(request).await.map(|response| response.map(Body::new));
    };

    let (parts, body) = request.into_parts();
    let body = match Limited::new(body, handler.max_request_body_bytes()).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            return Ok(AppError::PayloadTooLarge(format!(
                "Request body exceeds {} bytes",
                handler.max_request_body_bytes()
            ))
            .into_response());
        }
        Err(e) => {
            tracing::warn!("Failed to read idempotent request body: {}", e);
            return Ok(
                AppError::Validation("Failed to read request body".to_string()).into_response(),
            );
        }
    };

    let fingerprint = Fingerprint::derive(&parts.method, parts.uri.path(), &body, &idempotency_key);

    if let Some(cached) = handler.replay(&fingerprint).await {
        return Ok(cached);
    }

    let claim = handler.claim(&fingerprint).await;
    if claim.is_busy() {
        return Ok(AppError::Conflict("Idempotent request".to_string()).into_response());
    }
    let lock = claim.into_token();

    handler.record_forwarded(&idempotency_key);
    let response = match inner.call(Request::from_parts(parts, Body::from(body))).await {
        Ok(response) => response,
        Err(e) => {
            if let Some(ref token) = lock {
                handler.release(&fingerprint, token).await;
            }
            return Err(e);
        }
    };

    let (parts, body) = response.into_parts();
    if !CachedResponse::is_cacheable_status(parts.status) {
        handler.record_skipped(&fingerprint, "unsuccessful status");
        if let Some(token) = lock {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move { handler.release(&fingerprint, &token).await });
        }
        return Ok(Response::from_parts(parts, Body::new(body)));
    }

    let capture = Capture::new(
        handler,
        fingerprint,
        parts.status,
        parts.headers.clone(),
        lock,
    );
    Ok(Response::from_parts(parts, Body::new(CaptureBody::new(body, capture))))
}
