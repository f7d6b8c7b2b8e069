pub mod atomic_metrics;
pub mod cache;
pub mod circuit_breaker;
pub mod guarded_payments;
pub mod http_client;
pub mod payment_service;
pub mod payment_store;
pub mod product_service;
pub mod retry;

pub use cache::{CacheGateway, CacheStore, InMemoryCache};
pub use circuit_breaker::{BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState, Operation};
pub use guarded_payments::GuardedPaymentService;
pub use http_client::{HttpError, ResilientClient};
pub use payment_service::{PaymentService, REVERT_SUCCESS_MESSAGE};
pub use payment_store::{InMemoryPaymentStore, PaymentStore, StoreError, StoreTransaction};
pub use product_service::{LookupError, ProductCatalog, ProductService};
pub use retry::{retry_with_policy, Backoff, RetryPolicy};
