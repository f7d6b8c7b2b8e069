pub mod config;

use crate::handlers::{metrics, payments};
use crate::services::{
    BreakerConfig, BreakerRegistry, CacheGateway, CacheStore, GuardedPaymentService, HttpError,
    InMemoryPaymentStore, PaymentService, PaymentStore, ProductService, ResilientClient,
    RetryPolicy,
};
use axum::{routing::get, Router};
use config::Config;
use std::sync::Arc;

pub fn router(service: Arc<GuardedPaymentService>) -> Router {
    Router::new()
        .route("/health", get(metrics::health))
        .route("/metrics", get(metrics::get_metrics))
        .route(
            "/payments",
            get(payments::list_payments).post(payments::create_payment),
        )
        // GET and DELETE share the segment; the router allows one parameter name per segment.
        .route(
            "/payments/:id",
            get(payments::get_payment).delete(payments::compensate_payment),
        )
        .with_state(service)
}

/// Wires the payment stack over the given cache backend and payment store.
pub fn build_service(
    config: &Config,
    cache_store: Arc<dyn CacheStore>,
    payment_store: Arc<dyn PaymentStore>,
) -> Result<Arc<GuardedPaymentService>, HttpError> {
    let cache = CacheGateway::new(cache_store, config.cache_ttl());

    let mut client = ResilientClient::new(config.product_service_timeout(), RetryPolicy::from(config))?;
    if config.cache_http_responses {
        client = client.with_response_cache(cache.clone());
    }

    let products = ProductService::new(Arc::new(client), cache, config.product_service_url.clone());
    let payments = PaymentService::new(payment_store, Arc::new(products));
    let breakers = BreakerRegistry::new(BreakerConfig::from(config));

    Ok(Arc::new(GuardedPaymentService::new(
        Arc::new(payments),
        Arc::new(breakers),
    )))
}

/// In-process defaults: [`InMemoryPaymentStore`] with the given cache.
pub fn build_in_memory(
    config: &Config,
    cache_store: Arc<dyn CacheStore>,
) -> Result<Arc<GuardedPaymentService>, HttpError> {
    build_service(config, cache_store, Arc::new(InMemoryPaymentStore::new()))
}
