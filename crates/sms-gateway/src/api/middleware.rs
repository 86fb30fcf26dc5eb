//! Rate limiting, API key checks and request logging.

use crate::error::GatewayError;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::{num::NonZeroU32, sync::Arc, time::Instant};
use tracing::{debug, error, info, warn};

/// Header carrying the shared API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Unkeyed limiter shared by every route.
pub type GlobalLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Request budget for the whole gateway.
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<GlobalLimiter>,
}

impl RateLimitState {
    /// Allow `requests_per_minute` requests; zero is treated as one.
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        }
    }

    /// Budget large enough that tests never hit it.
    pub fn permissive() -> Self {
        Self::new(10_000)
    }

    /// Take one request from the budget.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// Reject requests over the global budget with 429.
///
/// Long-polling code lookups count once, when they arrive.
pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    if !rate_limit.try_acquire() {
        warn!(path = %request.uri().path(), "Global rate limit exceeded");
        return Err(GatewayError::RateLimitExceeded);
    }

    Ok(next.run(request).await)
}

/// Hash a secret using SHA-256.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Shared-key check for write endpoints.
///
/// With no key configured every request passes.
#[derive(Clone, Default)]
pub struct ApiKeyGuard {
    key: Option<Arc<SecretString>>,
}

impl ApiKeyGuard {
    pub fn new(api_key: Option<&str>) -> Self {
        Self {
            key: api_key.map(|k| Arc::new(SecretString::new(k.to_string()))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Compare digests of the configured and provided keys.
    pub fn verify(&self, provided: Option<&str>) -> bool {
        match (&self.key, provided) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(expected), Some(provided)) => {
                hash_secret(expected.expose_secret()) == hash_secret(provided)
            }
        }
    }

    /// Check the API key header of a request.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), GatewayError> {
        let provided = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());

        if self.verify(provided) {
            Ok(())
        } else {
            warn!(header_present = provided.is_some(), "Rejected request with bad API key");
            Err(GatewayError::Unauthorized)
        }
    }
}

/// Access log for every request.
///
/// Only the path is logged; code lookups carry the phone number in the
/// query string.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if status.is_server_error() {
        error!(%method, %path, %status, elapsed_ms, "Request failed");
    } else if status.is_client_error() {
        warn!(%method, %path, %status, elapsed_ms, "Request rejected");
    } else if path == "/health" {
        debug!(%method, %path, %status, elapsed_ms, "Request completed");
    } else {
        info!(%method, %path, %status, elapsed_ms, "Request completed");
    }

    response
}
