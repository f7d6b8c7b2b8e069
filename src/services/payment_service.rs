//! Payment lifecycle: validation, price resolution, atomic persistence and compensation.
//!
//! Creation runs `validate -> begin -> resolve price -> compute total -> insert -> commit`.
//! Validation failures never open a transaction. Every failure after `begin` rolls the
//! transaction back before the original error is returned.

use crate::error::{PaymentError, ValidationError};
use crate::models::payment::{NewPayment, Payment, PaymentId, PaymentMethod, ProductId};
use crate::models::product::CachedProduct;
use crate::services::circuit_breaker::Operation;
use crate::services::payment_store::{PaymentStore, StoreError, StoreTransaction};
use crate::services::product_service::{LookupError, ProductCatalog};
use crate::utils::money;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Confirmation returned by a successful compensation. Callers match it verbatim.
pub const REVERT_SUCCESS_MESSAGE: &str =
    "Pago revertido exitosamente. La compensación de inventario debe ser gestionada por el orquestador.";

/// A payment order whose fields passed range validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidOrder {
    pub product_id: ProductId,
    pub quantity: f64,
    pub payment_method: PaymentMethod,
}

/// Checks the raw order fields in a fixed order: presence, product id, quantity, method.
pub fn validate_order(
    product_id: ProductId,
    quantity: f64,
    payment_method: &str,
) -> Result<ValidOrder, ValidationError> {
    if payment_method.is_empty() {
        return Err(ValidationError::MissingFields);
    }
    if product_id <= 0 {
        return Err(ValidationError::InvalidProductId);
    }
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(ValidationError::InvalidQuantity);
    }
    let payment_method = payment_method.parse::<PaymentMethod>()?;

    Ok(ValidOrder {
        product_id,
        quantity,
        payment_method,
    })
}

pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    products: Arc<dyn ProductCatalog>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn PaymentStore>, products: Arc<dyn ProductCatalog>) -> Self {
        Self { store, products }
    }

    /// All payments, newest first.
    pub async fn get_payments(&self) -> Result<Vec<Payment>, PaymentError> {
        self.store.find_all().await.map_err(|err| {
            error!(error = %err, "failed to list payments");
            PaymentError::Retrieval(err)
        })
    }

    /// `Ok(None)` when no payment has this id.
    pub async fn get_payment_by_id(&self, id: PaymentId) -> Result<Option<Payment>, PaymentError> {
        self.store.find_by_id(id).await.map_err(|err| {
            error!(payment_id = id, error = %err, "failed to load payment");
            PaymentError::Retrieval(err)
        })
    }

    pub async fn process_payment(
        &self,
        product_id: ProductId,
        quantity: f64,
        payment_method: &str,
    ) -> Result<Payment, PaymentError> {
        let order = validate_order(product_id, quantity, payment_method).map_err(|err| {
            warn!(product_id, quantity, payment_method, code = err.code(), "payment rejected");
            err
        })?;

        let products = Arc::clone(&self.products);
        let payment = self
            .within_transaction(Operation::ProcessPayment, move |tx| {
                Box::pin(async move {
                    let product = resolve_product(products.as_ref(), order.product_id).await?;
                    let total = money::total_price(product.price, order.quantity);
                    tx.insert(NewPayment {
                        product_id: order.product_id,
                        price: total,
                        payment_method: order.payment_method,
                    })
                    .await
                    .map_err(PaymentError::Processing)
                })
            })
            .await?;

        info!(
            payment_id = payment.id,
            product_id = payment.product_id,
            total = %money::format_amount(payment.price),
            method = %payment.payment_method,
            "payment created"
        );
        Ok(payment)
    }

    /// Deletes the payment and returns [`REVERT_SUCCESS_MESSAGE`]. Not idempotent: a second
    /// call for the same id fails with [`PaymentError::NotFound`].
    pub async fn compensate_payment(&self, payment_id: PaymentId) -> Result<&'static str, PaymentError> {
        self.within_transaction(Operation::CompensatePayment, move |tx| {
            Box::pin(async move {
                let found = tx
                    .find_by_id(payment_id)
                    .await
                    .map_err(|err| store_failure(Operation::CompensatePayment, err))?;
                if found.is_none() {
                    return Err(PaymentError::NotFound(payment_id));
                }
                tx.delete(payment_id)
                    .await
                    .map_err(|err| store_failure(Operation::CompensatePayment, err))
            })
        })
        .await?;

        info!(payment_id, "payment compensated");
        Ok(REVERT_SUCCESS_MESSAGE)
    }

    /// Runs `body` inside a store transaction: commit on `Ok`, rollback on `Err`.
    /// If the returned future is dropped early the transaction is dropped uncommitted,
    /// which the store contract treats as a rollback.
    async fn within_transaction<T, F>(&self, operation: Operation, body: F) -> Result<T, PaymentError>
    where
        F: for<'t> FnOnce(&'t mut dyn StoreTransaction) -> BoxFuture<'t, Result<T, PaymentError>>,
    {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|err| store_failure(operation, err))?;

        let outcome = body(tx.as_mut()).await;
        match outcome {
            Ok(value) => {
                tx.commit().await.map_err(|err| {
                    warn!(%operation, error = %err, "commit failed, transaction rolled back");
                    store_failure(operation, err)
                })?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(%operation, error = %rollback_err, "rollback failed");
                }
                warn!(%operation, code = err.code(), error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }
}

async fn resolve_product(
    products: &dyn ProductCatalog,
    product_id: ProductId,
) -> Result<CachedProduct, PaymentError> {
    let product = products
        .get_product_by_id(product_id)
        .await
        .map_err(|err| match err {
            LookupError::NotFound(id) => PaymentError::ProductNotFound(id),
            other => PaymentError::ServiceUnavailable(other.to_string()),
        })?;

    if !money::is_valid_price(product.price) {
        warn!(product_id, price = product.price, "product service returned an unusable price");
        return Err(ValidationError::InvalidPrice.into());
    }
    Ok(product)
}

fn store_failure(operation: Operation, err: StoreError) -> PaymentError {
    match (operation, err) {
        (Operation::CompensatePayment, StoreError::RowMissing(id)) => PaymentError::NotFound(id),
        (Operation::CompensatePayment, err) => PaymentError::Revert(err),
        (Operation::ProcessPayment, err) => PaymentError::Processing(err),
        (Operation::ListPayments | Operation::GetPayment, err) => PaymentError::Retrieval(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_validation_order_of_checks() {
        assert_eq!(validate_order(0, 0.0, ""), Err(ValidationError::MissingFields));
        assert_eq!(validate_order(0, 0.0, "bitcoin"), Err(ValidationError::InvalidProductId));
        assert_eq!(validate_order(1, 0.0, "bitcoin"), Err(ValidationError::InvalidQuantity));
        assert_eq!(validate_order(1, 1.0, "bitcoin"), Err(ValidationError::InvalidPaymentMethod));
        assert_eq!(
            validate_order(1, 1.0, "paypal"),
            Ok(ValidOrder {
                product_id: 1,
                quantity: 1.0,
                payment_method: PaymentMethod::Paypal
            })
        );
    }

    #[test]
    fn test_non_finite_quantity_is_rejected() {
        for quantity in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -1.0] {
            assert_eq!(
                validate_order(1, quantity, "tarjeta"),
                Err(ValidationError::InvalidQuantity)
            );
        }
    }

    #[test]
    fn test_compensation_row_race_maps_to_not_found() {
        assert!(matches!(
            store_failure(Operation::CompensatePayment, StoreError::RowMissing(9)),
            PaymentError::NotFound(9)
        ));
        assert!(matches!(
            store_failure(Operation::ProcessPayment, StoreError::TransactionClosed),
            PaymentError::Processing(_)
        ));
    }

    proptest! {
        #[test]
        fn unknown_methods_never_validate(method in "[a-z ]{1,24}") {
            prop_assume!(!["tarjeta", "paypal", "transferencia bancaria"].contains(&method.as_str()));
            prop_assert_eq!(
                validate_order(1, 1.0, &method),
                Err(ValidationError::InvalidPaymentMethod)
            );
        }

        #[test]
        fn positive_inputs_validate(product_id in 1i64..1_000_000, quantity in 0.001f64..1.0e6) {
            prop_assert!(validate_order(product_id, quantity, "transferencia bancaria").is_ok());
        }
    }
}
