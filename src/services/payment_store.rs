use crate::models::payment::{NewPayment, Payment, PaymentId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("payment store unavailable: {0}")]
    Unavailable(String),
    /// A row this transaction deleted was removed by a concurrent transaction first.
    #[error("payment {0} no longer exists")]
    RowMissing(PaymentId),
    #[error("transaction already finished")]
    TransactionClosed,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable record of payments.
///
/// Reads outside a transaction see committed data only. All writes go through a
/// [`StoreTransaction`] obtained from [`PaymentStore::begin`].
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

    /// All payments, newest first.
    async fn find_all(&self) -> StoreResult<Vec<Payment>>;

    async fn find_by_id(&self, id: PaymentId) -> StoreResult<Option<Payment>>;
}

/// An open unit of work against the store.
///
/// Contract for implementors:
/// - `commit` and `rollback` finish the transaction; any later call fails with
///   [`StoreError::TransactionClosed`].
/// - A failed `commit` leaves nothing applied.
/// - Dropping a transaction that was not committed rolls it back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Stages a new row and returns it with its store-assigned id.
    async fn insert(&mut self, payment: NewPayment) -> StoreResult<Payment>;

    async fn find_by_id(&mut self, id: PaymentId) -> StoreResult<Option<Payment>>;

    /// Stages deletion of an existing row.
    async fn delete(&mut self, id: PaymentId) -> StoreResult<()>;

    async fn commit(&mut self) -> StoreResult<()>;

    async fn rollback(&mut self) -> StoreResult<()>;
}

struct StoreInner {
    rows: RwLock<BTreeMap<PaymentId, Payment>>,
    next_id: AtomicI64,
}

/// Process-local store. Ids come from a sequence that is not reused after rollback,
/// the same way a database sequence behaves.
#[derive(Clone)]
pub struct InMemoryPaymentStore {
    inner: Arc<StoreInner>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                rows: RwLock::new(BTreeMap::new()),
                next_id: AtomicI64::new(1),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryPaymentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            store: Arc::clone(&self.inner),
            inserts: BTreeMap::new(),
            deletes: BTreeSet::new(),
            state: TxState::Open,
        }))
    }

    async fn find_all(&self) -> StoreResult<Vec<Payment>> {
        let rows = self.inner.rows.read();
        Ok(rows.values().rev().cloned().collect())
    }

    async fn find_by_id(&self, id: PaymentId) -> StoreResult<Option<Payment>> {
        Ok(self.inner.rows.read().get(&id).cloned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Open,
    Committed,
    RolledBack,
}

struct InMemoryTransaction {
    store: Arc<StoreInner>,
    inserts: BTreeMap<PaymentId, Payment>,
    deletes: BTreeSet<PaymentId>,
    state: TxState,
}

impl InMemoryTransaction {
    fn ensure_open(&self) -> StoreResult<()> {
        match self.state {
            TxState::Open => Ok(()),
            _ => Err(StoreError::TransactionClosed),
        }
    }

    fn visible(&self, id: PaymentId) -> Option<Payment> {
        if self.deletes.contains(&id) {
            return None;
        }
        self.inserts
            .get(&id)
            .cloned()
            .or_else(|| self.store.rows.read().get(&id).cloned())
    }

    fn discard(&mut self) {
        self.inserts.clear();
        self.deletes.clear();
        self.state = TxState::RolledBack;
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn insert(&mut self, payment: NewPayment) -> StoreResult<Payment> {
        self.ensure_open()?;
        let id = self.store.next_id.fetch_add(1, Ordering::SeqCst);
        let payment = payment.with_id(id);
        self.inserts.insert(id, payment.clone());
        Ok(payment)
    }

    async fn find_by_id(&mut self, id: PaymentId) -> StoreResult<Option<Payment>> {
        self.ensure_open()?;
        Ok(self.visible(id))
    }

    async fn delete(&mut self, id: PaymentId) -> StoreResult<()> {
        self.ensure_open()?;
        if self.inserts.remove(&id).is_some() {
            return Ok(());
        }
        if self.visible(id).is_none() {
            return Err(StoreError::RowMissing(id));
        }
        self.deletes.insert(id);
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        let mut rows = self.store.rows.write();
        if let Some(&gone) = self.deletes.iter().find(|id| !rows.contains_key(*id)) {
            drop(rows);
            self.discard();
            return Err(StoreError::RowMissing(gone));
        }
        for id in &self.deletes {
            rows.remove(id);
        }
        rows.append(&mut self.inserts);
        drop(rows);
        self.deletes.clear();
        self.state = TxState::Committed;
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        self.discard();
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if self.state == TxState::Open {
            debug!(
                staged_inserts = self.inserts.len(),
                staged_deletes = self.deletes.len(),
                "transaction dropped before commit, discarding staged changes"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::PaymentMethod;

    fn new_payment(price: f64) -> NewPayment {
        NewPayment {
            product_id: 1,
            price,
            payment_method: PaymentMethod::Card,
        }
    }

    #[tokio::test]
    async fn test_commit_makes_rows_visible() {
        let store = InMemoryPaymentStore::new();
        let mut tx = store.begin().await.unwrap();
        let payment = tx.insert(new_payment(10.0)).await.unwrap();

        assert!(store.find_by_id(payment.id).await.unwrap().is_none());
        assert_eq!(tx.find_by_id(payment.id).await.unwrap(), Some(payment.clone()));

        tx.commit().await.unwrap();
        assert_eq!(store.find_by_id(payment.id).await.unwrap(), Some(payment));
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_changes() {
        let store = InMemoryPaymentStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert(new_payment(10.0)).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::TransactionClosed)));

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(new_payment(20.0)).await.unwrap();
        }

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_find_all_is_newest_first() {
        let store = InMemoryPaymentStore::new();
        for price in [1.0, 2.0, 3.0] {
            let mut tx = store.begin().await.unwrap();
            tx.insert(new_payment(price)).await.unwrap();
            tx.commit().await.unwrap();
        }
        let prices: Vec<f64> = store.find_all().await.unwrap().iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![3.0, 2.0, 1.0]);
    }

    #[tokio::test]
    async fn test_racing_deletes_only_one_commits() {
        let store = InMemoryPaymentStore::new();
        let mut setup = store.begin().await.unwrap();
        let payment = setup.insert(new_payment(5.0)).await.unwrap();
        setup.commit().await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.delete(payment.id).await.unwrap();
        second.delete(payment.id).await.unwrap();

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(StoreError::RowMissing(id)) if id == payment.id
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_row() {
        let store = InMemoryPaymentStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(tx.delete(42).await, Err(StoreError::RowMissing(42))));
    }
}
