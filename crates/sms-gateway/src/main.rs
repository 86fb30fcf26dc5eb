//! SMS gateway - Entry point.

use anyhow::Context;
use sms_code::{CodeService, SystemClock};
use sms_gateway::{
    api::{create_router_with_rate_limit, ApiKeyGuard, AppState, RateLimitState},
    config::{Config, LogConfig},
    open_store,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    init_logging(&config.log);

    info!("Starting SMS gateway");

    let store = open_store(&config.storage)
        .await
        .context("Failed to open record store")?;
    info!("Record store ready with {} records", store.count().await?);

    let service = CodeService::new(store, Arc::new(SystemClock), config.lookup.policy());

    let api_key = ApiKeyGuard::new(config.auth.api_key());
    if !api_key.is_enabled() {
        warn!("No API key configured, write endpoints are unauthenticated");
    }

    let state = AppState::new(service, api_key, config.lookup.default_wait_timeout);
    let rate_limit = RateLimitState::new(config.rate_limit.global_per_minute);
    let app = create_router_with_rate_limit(state, rate_limit);

    let addr = SocketAddr::new(
        config
            .server
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address: {}", config.server.listen_addr))?,
        config.server.port,
    );

    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("SMS gateway stopped");
    Ok(())
}

fn init_logging(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
