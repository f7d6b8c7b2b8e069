#![allow(dead_code)]

use async_trait::async_trait;
use payment_service::models::payment::{NewPayment, Payment, PaymentId, ProductId};
use payment_service::models::product::CachedProduct;
use payment_service::services::payment_store::StoreResult;
use payment_service::services::{
    InMemoryPaymentStore, LookupError, PaymentStore, ProductCatalog, StoreError, StoreTransaction,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn product(product_id: ProductId, price: f64) -> CachedProduct {
    CachedProduct {
        product_id,
        name: format!("product-{product_id}"),
        price,
        activate: true,
    }
}

/// Catalog with fixed answers that counts how often it is asked.
#[derive(Default)]
pub struct StubCatalog {
    products: HashMap<ProductId, CachedProduct>,
    failure: Option<LookupError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubCatalog {
    pub fn with_products(products: impl IntoIterator<Item = CachedProduct>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.product_id, p)).collect(),
            ..Default::default()
        }
    }

    pub fn failing(err: LookupError) -> Self {
        Self {
            failure: Some(err),
            ..Default::default()
        }
    }

    /// Every lookup sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductCatalog for StubCatalog {
    async fn get_product_by_id(&self, product_id: ProductId) -> Result<CachedProduct, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        self.products
            .get(&product_id)
            .cloned()
            .ok_or(LookupError::NotFound(product_id))
    }
}

#[derive(Default)]
pub struct Counters {
    pub begun: AtomicUsize,
    pub committed: AtomicUsize,
    pub rolled_back: AtomicUsize,
    /// Transactions dropped without commit or rollback.
    pub abandoned: AtomicUsize,
}

impl Counters {
    pub fn begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn rolled_back(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }

    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

/// Wraps [`InMemoryPaymentStore`], counting transaction outcomes and failing on demand.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: InMemoryPaymentStore,
    pub counters: Arc<Counters>,
    pub fail_reads: AtomicBool,
    pub fail_inserts: Arc<AtomicBool>,
    pub fail_commits: Arc<AtomicBool>,
    /// Milliseconds each commit stalls before applying.
    pub commit_delay_ms: Arc<AtomicU64>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl PaymentStore for RecordingStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.begin().await?;
        Ok(Box::new(RecordingTransaction {
            inner,
            counters: Arc::clone(&self.counters),
            fail_inserts: Arc::clone(&self.fail_inserts),
            fail_commits: Arc::clone(&self.fail_commits),
            commit_delay_ms: Arc::clone(&self.commit_delay_ms),
            finished: false,
        }))
    }

    async fn find_all(&self) -> StoreResult<Vec<Payment>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.inner.find_all().await
    }

    async fn find_by_id(&self, id: PaymentId) -> StoreResult<Option<Payment>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.inner.find_by_id(id).await
    }
}

struct RecordingTransaction {
    inner: Box<dyn StoreTransaction>,
    counters: Arc<Counters>,
    fail_inserts: Arc<AtomicBool>,
    fail_commits: Arc<AtomicBool>,
    commit_delay_ms: Arc<AtomicU64>,
    finished: bool,
}

#[async_trait]
impl StoreTransaction for RecordingTransaction {
    async fn insert(&mut self, payment: NewPayment) -> StoreResult<Payment> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".into()));
        }
        self.inner.insert(payment).await
    }

    async fn find_by_id(&mut self, id: PaymentId) -> StoreResult<Option<Payment>> {
        self.inner.find_by_id(id).await
    }

    async fn delete(&mut self, id: PaymentId) -> StoreResult<()> {
        self.inner.delete(id).await
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let delay = self.commit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.finished = true;
        if self.fail_commits.load(Ordering::SeqCst) {
            // A failed commit applies nothing.
            self.inner.rollback().await?;
            return Err(StoreError::Unavailable("commit aborted".into()));
        }
        self.inner.commit().await?;
        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.finished = true;
        self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback().await
    }
}

impl Drop for RecordingTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.counters.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}
