use axum::body::Body;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Header attached to every response served from the cache.
pub const REPLAY_HEADER: &str = "x-idempotent-replay";

/// Responses with a status at or above this are never cached.
const FIRST_CLIENT_ERROR_STATUS: u16 = 400;

/// Headers recomputed by the server for each response, never replayed.
const TRANSPORT_HEADERS: [HeaderName; 3] = [CONTENT_LENGTH, TRANSFER_ENCODING, CONNECTION];

/// A response captured from the first successful execution of a request.
///
/// Stored as a MessagePack map. Headers are kept as an ordered list of
/// name/value pairs so repeated names and non-UTF-8 values survive the
/// round trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub body: Bytes,
    pub headers: Vec<(String, Bytes)>,
    pub status_code: u16,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        let headers = headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    Bytes::copy_from_slice(value.as_bytes()),
                )
            })
            .collect();

        Self {
            body,
            headers,
            status_code: status.as_u16(),
        }
    }

    pub fn is_cacheable_status(status: StatusCode) -> bool {
        status.as_u16() < FIRST_CLIENT_ERROR_STATUS
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(self).map_err(|e| AppError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| AppError::MalformedCachedRecord(e.to_string()))
    }

    /// Rebuilds the HTTP response, marking it as a replay.
    pub fn into_response(self) -> Result<Response<Body>> {
        let status = StatusCode::from_u16(self.status_code).map_err(|e| {
            AppError::MalformedCachedRecord(format!("invalid status code: {}", e))
        })?;

        let mut headers = HeaderMap::with_capacity(self.headers.len() + 1);
        for (name, value) in self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                AppError::MalformedCachedRecord(format!("invalid header name: {}", e))
            })?;
            if TRANSPORT_HEADERS.contains(&name) {
                continue;
            }
            let value = HeaderValue::from_maybe_shared(value).map_err(|e| {
                AppError::MalformedCachedRecord(format!("invalid header value: {}", e))
            })?;
            headers.append(name, value);
        }
        headers.insert(REPLAY_HEADER, HeaderValue::from_static("true"));

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
