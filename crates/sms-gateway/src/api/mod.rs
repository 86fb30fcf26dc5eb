//! HTTP API for the SMS gateway.

mod handlers;
mod middleware;
mod types;

pub use handlers::*;
pub use middleware::{
    hash_secret, logging_middleware, rate_limit_middleware, ApiKeyGuard, RateLimitState,
    API_KEY_HEADER,
};
pub use types::*;

use axum::{
    extract::Request,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sms_code::CodeService;
use tower_http::trace::TraceLayer;
use tracing::debug_span;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Ingestion and lookup
    pub service: CodeService,
    /// Key check for write endpoints
    pub api_key: ApiKeyGuard,
    /// Wait timeout in seconds when the client sends none
    pub default_wait_timeout: i64,
}

impl AppState {
    /// Create new application state.
    pub fn new(service: CodeService, api_key: ApiKeyGuard, default_wait_timeout: i64) -> Self {
        Self {
            service,
            api_key,
            default_wait_timeout,
        }
    }
}

/// Create the API router with custom rate limiting.
pub fn create_router_with_rate_limit(state: AppState, rate_limit: RateLimitState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/sms/receive", post(handlers::receive_sms))
        .route("/v1/sms/code", get(handlers::get_code))
        .route("/v1/sms/history", get(handlers::list_history))
        .route(
            "/v1/sms/:id",
            get(handlers::get_sms).delete(handlers::delete_sms),
        )
        .layer(axum_middleware::from_fn_with_state(
            rate_limit,
            rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn(logging_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                debug_span!("http", method = %request.method(), path = %request.uri().path())
            }),
        )
        .with_state(state)
}
