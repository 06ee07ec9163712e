use axum::body::Body;
use http::{HeaderName, Method, Request, Response};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::IdempotencySettings;
use crate::error::{AppError, Result};
use crate::idempotency::fingerprint::Fingerprint;
use crate::idempotency::record::CachedResponse;
use crate::idempotency::storage::{IdempotencyStore, LockToken};
use crate::observability::{get_metrics, mask_sensitive};

/// Metrics for idempotency handling.
#[derive(Debug, Default)]
pub struct IdempotencyMetrics {
    pub total_requests: AtomicU64,
    pub replayed_requests: AtomicU64,
    pub forwarded_requests: AtomicU64,
    pub stored_responses: AtomicU64,
    pub skipped_responses: AtomicU64,
    pub rejected_requests: AtomicU64,
    pub cache_errors: AtomicU64,
}

impl IdempotencyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replayed(&self) {
        self.replayed_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_outcome("replayed");
    }

    pub fn record_forwarded(&self) {
        self.forwarded_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_outcome("forwarded");
    }

    pub fn record_stored(&self) {
        self.stored_responses.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_outcome("stored");
    }

    pub fn record_skipped(&self) {
        self.skipped_responses.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_outcome("skipped");
    }

    pub fn record_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_outcome("rejected");
    }

    pub fn record_cache_error(&self, operation: &'static str) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_cache_error(operation);
    }

    pub fn replay_rate(&self) -> f64 {
        self.snapshot().replay_rate()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            replayed_requests: self.replayed_requests.load(Ordering::Relaxed),
            forwarded_requests: self.forwarded_requests.load(Ordering::Relaxed),
            stored_responses: self.stored_responses.load(Ordering::Relaxed),
            skipped_responses: self.skipped_responses.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub replayed_requests: u64,
    pub forwarded_requests: u64,
    pub stored_responses: u64,
    pub skipped_responses: u64,
    pub rejected_requests: u64,
    pub cache_errors: u64,
}

impl MetricsSnapshot {
    pub fn replay_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.replayed_requests as f64 / self.total_requests as f64
        }
    }
}

/// Result of trying to claim the in-flight marker for a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The in-flight guard is disabled.
    NotRequired,
    /// This request holds the marker and must release it.
    Acquired(LockToken),
    /// Another request with the same fingerprint is still running.
    Busy,
    /// The backend failed; proceed unguarded.
    Unavailable,
}

impl ClaimOutcome {
    pub fn is_busy(&self) -> bool {
        matches!(self, ClaimOutcome::Busy)
    }

    /// The token to release with, if this request holds the marker.
    pub fn into_token(self) -> Option<LockToken> {
        match self {
            ClaimOutcome::Acquired(token) => Some(token),
            _ => None,
        }
    }
}

/// Decides, per request, whether and how the idempotency cache is used.
///
/// Every cache failure is absorbed here: lookups fail open as misses and
/// stores are logged and dropped.
pub struct IdempotencyHandler {
    store: IdempotencyStore,
    header_name: HeaderName,
    protected_methods: Vec<Method>,
    settings: IdempotencySettings,
    metrics: Arc<IdempotencyMetrics>,
}

impl IdempotencyHandler {
    pub fn new(store: IdempotencyStore, settings: IdempotencySettings) -> Result<Self> {
        let header_name = HeaderName::from_bytes(settings.header_name.as_bytes()).map_err(|e| {
            AppError::Config(config::ConfigError::Message(format!(
                "invalid idempotency header name {:?}: {}",
                settings.header_name, e
            )))
        })?;

        let protected_methods = settings
            .protected_methods
            .iter()
            .map(|method| {
                Method::from_bytes(method.trim().to_uppercase().as_bytes()).map_err(|e| {
                    AppError::Config(config::ConfigError::Message(format!(
                        "invalid protected method {:?}: {}",
                        method, e
                    )))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            store,
            header_name,
            protected_methods,
            settings,
            metrics: Arc::new(IdempotencyMetrics::new()),
        })
    }

    /// Gets the metrics for this handler.
    pub fn metrics(&self) -> Arc<IdempotencyMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Returns the idempotency key if the request must be intercepted.
    pub fn idempotency_key<B>(&self, request: &Request<B>) -> Option<String> {
        if !self.protected_methods.contains(request.method()) {
            return None;
        }

        let key = request.headers().get(&self.header_name)?.to_str().ok()?;
        if key.is_empty() {
            return None;
        }

        self.metrics.record_request();
        Some(key.to_string())
    }

    /// Looks up a previously captured response and rebuilds it.
    pub async fn replay(&self, fingerprint: &Fingerprint) -> Option<Response<Body>> {
        let record = match self.store.get(fingerprint).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                self.metrics.record_cache_error("get");
                tracing::warn!(%fingerprint, "Idempotency lookup failed, proceeding without replay: {}", e);
                return None;
            }
        };

        match record.into_response() {
            Ok(response) => {
                self.metrics.record_replayed();
                tracing::debug!(%fingerprint, status = response.status().as_u16(), "Replaying cached response");
                Some(response)
            }
            Err(e) => {
                self.metrics.record_cache_error("decode");
                tracing::warn!(%fingerprint, "Ignoring unusable cached response: {}", e);
                None
            }
        }
    }

    /// Claims the in-flight marker when the guard is enabled.
    pub async fn claim(&self, fingerprint: &Fingerprint) -> ClaimOutcome {
        if !self.settings.in_flight_lock {
            return ClaimOutcome::NotRequired;
        }

        match self.store.claim(fingerprint, self.settings.lock_ttl()).await {
            Ok(Some(token)) => ClaimOutcome::Acquired(token),
            Ok(None) => {
                self.metrics.record_rejected();
                tracing::info!(%fingerprint, "Duplicate request is still in flight");
                ClaimOutcome::Busy
            }
            Err(e) => {
                self.metrics.record_cache_error("claim");
                tracing::warn!(%fingerprint, "Failed to claim in-flight marker: {}", e);
                ClaimOutcome::Unavailable
            }
        }
    }

    pub async fn release(&self, fingerprint: &Fingerprint, token: &LockToken) {
        match self.store.release(fingerprint, token).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(%fingerprint, "In-flight marker expired before the response completed");
            }
            Err(e) => {
                self.metrics.record_cache_error("release");
                tracing::warn!(%fingerprint, "Failed to release in-flight marker: {}", e);
            }
        }
    }

    /// Stores a captured response. Failures only cost the replay guarantee.
    pub async fn store(&self, fingerprint: &Fingerprint, record: CachedResponse) {
        let body_len = record.body.len();
        match self
            .store
            .put(fingerprint, &record, self.settings.ttl())
            .await
        {
            Ok(()) => {
                self.metrics.record_stored();
                get_metrics().record_cached_body_size(body_len);
                tracing::debug!(%fingerprint, status = record.status_code, body_len, "Cached response");
            }
            Err(e) => {
                self.metrics.record_cache_error("put");
                tracing::warn!(%fingerprint, "Failed to cache response, retries will re-execute: {}", e);
            }
        }
    }

    pub fn record_forwarded(&self, idempotency_key: &str) {
        self.metrics.record_forwarded();
        tracing::debug!(key = %mask_sensitive(idempotency_key, 3), "Forwarding idempotent request");
    }

    pub fn record_skipped(&self, fingerprint: &Fingerprint, reason: &str) {
        self.metrics.record_skipped();
        tracing::info!(%fingerprint, reason, "Response not cached");
    }

    pub fn max_cacheable_body_bytes(&self) -> usize {
        self.settings.max_cacheable_body_bytes
    }

    pub fn max_request_body_bytes(&self) -> usize {
        self.settings.max_request_body_bytes
    }
}
