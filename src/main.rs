use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use idempotent_api::api::{create_router, AppState};
use idempotent_api::config::Settings;
use idempotent_api::idempotency::{
    IdempotencyHandler, IdempotencyStore, InMemoryCache, KeyValueCache, RedisCache,
};
use idempotent_api::observability::{init_logging, init_metrics, HealthChecker, LogConfig};
use idempotent_api::repositories::InMemoryExampleRepository;
use idempotent_api::services::ExampleService;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&LogConfig::from(&settings.logging));
    info!("Configuration loaded");

    let metrics_handle = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus exporter unavailable: {}", e);
            None
        }
    };

    let cache = connect_cache(&settings).await;

    let store = IdempotencyStore::new(Arc::clone(&cache), settings.idempotency.key_prefix.clone());
    let idempotency = Arc::new(IdempotencyHandler::new(store, settings.idempotency.clone())?);
    info!(
        header = %settings.idempotency.header_name,
        ttl_seconds = settings.idempotency.ttl_seconds,
        in_flight_lock = settings.idempotency.in_flight_lock,
        "Idempotency middleware configured"
    );

    let examples = ExampleService::new(Arc::new(InMemoryExampleRepository::new()));
    let mut state = AppState::new(
        examples,
        Arc::new(HealthChecker::new(cache)),
        idempotency.metrics(),
    );
    if let Some(handle) = metrics_handle {
        state = state.with_metrics(handle);
    }

    let app = create_router(state, idempotency);

    let address = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Connects to Redis when configured. Falls back to the in-process cache,
/// which only deduplicates requests reaching this instance.
async fn connect_cache(settings: &Settings) -> Arc<dyn KeyValueCache> {
    if let Some(ref redis) = settings.redis {
        info!("Connecting to Redis...");
        match RedisCache::connect(&redis.url).await {
            Ok(cache) => {
                info!("Redis connection established");
                return Arc::new(cache);
            }
            Err(e) => warn!("Redis unavailable, using in-memory idempotency cache: {}", e),
        }
    } else {
        info!("No Redis configured, using in-memory idempotency cache");
    }

    let cache = Arc::new(InMemoryCache::new());
    let purged = Arc::clone(&cache);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let removed = purged.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, "Purged expired idempotency entries");
            }
        }
    });
    cache
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
