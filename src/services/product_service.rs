use crate::models::payment::ProductId;
use crate::models::product::{CachedProduct, ProductEnvelope};
use crate::services::cache::{CacheGateway, CacheRead, CacheResult};
use crate::services::http_client::ResilientClient;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Why a product could not be resolved. Transport specifics are folded into
/// `Unavailable` so callers only branch on three outcomes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    #[error("product {0} not found")]
    NotFound(ProductId),
    #[error("malformed product data: {0}")]
    Malformed(String),
    #[error("product service unavailable: {0}")]
    Unavailable(String),
}

impl LookupError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Malformed(_) | Self::Unavailable(_) => 500,
        }
    }
}

/// Source of authoritative product price and activation data.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product_by_id(&self, product_id: ProductId) -> Result<CachedProduct, LookupError>;
}

/// Cache-first product lookup backed by the remote product service.
pub struct ProductService {
    client: Arc<ResilientClient>,
    cache: CacheGateway,
    base_url: String,
}

impl ProductService {
    pub fn new(client: Arc<ResilientClient>, cache: CacheGateway, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            cache,
            base_url,
        }
    }

    pub fn product_url(&self, product_id: ProductId) -> String {
        format!("{}/{}", self.base_url, product_id)
    }

    /// Drops the cached entries for `product_id`, both the product and the raw response.
    pub async fn invalidate(&self, product_id: ProductId) -> CacheResult<()> {
        self.cache
            .clear(&[
                CacheGateway::product_key(product_id),
                CacheGateway::url_key(&self.product_url(product_id)),
            ])
            .await
    }
}

#[async_trait]
impl ProductCatalog for ProductService {
    async fn get_product_by_id(&self, product_id: ProductId) -> Result<CachedProduct, LookupError> {
        let key = CacheGateway::product_key(product_id);
        match self.cache.read::<CachedProduct>(&key).await {
            CacheRead::Hit(product) => {
                debug!(product_id, "product served from cache");
                return Ok(product);
            }
            CacheRead::Malformed(err) => {
                warn!(product_id, error = %err, "discarding malformed cache entry");
            }
            CacheRead::Miss => {}
        }

        let url = self.product_url(product_id);
        let body = match self.client.get_json(&url).await {
            Ok(body) => body,
            Err(err) if err.status() == Some(404) => return Err(LookupError::NotFound(product_id)),
            Err(err) => {
                error!(product_id, error = %err, "product service request failed");
                return Err(LookupError::Unavailable(err.to_string()));
            }
        };

        let product = decode_product(body)?;
        self.cache.write(&key, &product).await;
        Ok(product)
    }
}

/// Parses the product service envelope. Shape only: prices are not range-checked here.
pub fn decode_product(body: Value) -> Result<CachedProduct, LookupError> {
    serde_json::from_value::<ProductEnvelope>(body)
        .map(|envelope| envelope.data)
        .map_err(|err| LookupError::Malformed(err.to_string()))
}
