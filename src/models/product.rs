use super::payment::ProductId;
use serde::{Deserialize, Serialize};

/// Product data as held in the cache under `product:<id>`.
///
/// The product service names the identifier `id`; the cached form names it `productId`.
/// Both are accepted when decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedProduct {
    #[serde(rename = "productId", alias = "id")]
    pub product_id: ProductId,
    pub name: String,
    pub price: f64,
    pub activate: bool,
}

/// Response envelope of `GET <product-service>/<id>`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductEnvelope {
    pub data: CachedProduct,
}
