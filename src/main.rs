use anyhow::Context;
use payment_service::app::{self, config::Config};
use payment_service::services::{CacheStore, InMemoryCache};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        port = config.server_port,
        product_service = %config.product_service_url,
        "Starting payment service"
    );

    let cache = cache_store(&config).await;
    let service = app::build_in_memory(&config, cache).context("failed to build HTTP client")?;
    let router = app::router(service);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

#[cfg(feature = "cache-redis")]
async fn cache_store(config: &Config) -> Arc<dyn CacheStore> {
    use payment_service::services::cache::RedisCache;

    if let Some(url) = &config.redis_url {
        match RedisCache::connect(url).await {
            Ok(redis) => {
                info!("Using Redis cache");
                return Arc::new(redis);
            }
            Err(e) => warn!(error = %e, "Redis unavailable, falling back to in-memory cache"),
        }
    }
    Arc::new(InMemoryCache::new())
}

#[cfg(not(feature = "cache-redis"))]
async fn cache_store(config: &Config) -> Arc<dyn CacheStore> {
    if config.redis_url.is_some() {
        warn!("REDIS_URL is set but the cache-redis feature is disabled, using in-memory cache");
    }
    Arc::new(InMemoryCache::new())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
