use crate::error::PaymentError;
use crate::models::payment::{Payment, PaymentId, PaymentOrder};
use crate::services::atomic_metrics::{AtomicMetrics, MetricsSnapshot};
use crate::services::circuit_breaker::{BreakerError, BreakerRegistry, CircuitState, Operation};
use crate::services::payment_service::PaymentService;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Inbound boundary of the service: every operation runs through its own circuit breaker.
///
/// Only server-side faults count against a breaker, so a stream of bad requests cannot
/// open a circuit for well-behaved callers.
pub struct GuardedPaymentService {
    payments: Arc<PaymentService>,
    breakers: Arc<BreakerRegistry>,
    metrics: AtomicMetrics,
}

impl GuardedPaymentService {
    pub fn new(payments: Arc<PaymentService>, breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            payments,
            breakers,
            metrics: AtomicMetrics::new(),
        }
    }

    pub async fn list_payments(&self) -> Result<Vec<Payment>, PaymentError> {
        self.guarded(Operation::ListPayments, || self.payments.get_payments())
            .await
    }

    pub async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, PaymentError> {
        self.guarded(Operation::GetPayment, || self.payments.get_payment_by_id(id))
            .await
    }

    pub async fn create_payment(&self, order: PaymentOrder) -> Result<Payment, PaymentError> {
        let payment = self
            .guarded(Operation::ProcessPayment, || {
                self.payments
                    .process_payment(order.product_id, order.quantity, &order.payment_method)
            })
            .await?;
        self.metrics.increment_created();
        Ok(payment)
    }

    pub async fn compensate_payment(&self, payment_id: PaymentId) -> Result<&'static str, PaymentError> {
        let message = self
            .guarded(Operation::CompensatePayment, || {
                self.payments.compensate_payment(payment_id)
            })
            .await?;
        self.metrics.increment_compensated();
        Ok(message)
    }

    pub fn breaker_states(&self) -> Vec<(Operation, CircuitState)> {
        self.breakers.states()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn guarded<F, Fut, T>(&self, operation: Operation, call: F) -> Result<T, PaymentError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PaymentError>>,
    {
        let breaker = self.breakers.get(operation);
        let result = breaker
            .fire_with(call, PaymentError::is_server_fault)
            .await
            .map_err(|err| match err {
                BreakerError::Open(name) => PaymentError::CircuitOpen(name),
                BreakerError::Timeout { name, timeout } => PaymentError::ServiceUnavailable(
                    format!("{name} did not complete within {timeout:?}"),
                ),
                BreakerError::Inner(err) => err,
            });

        if let Err(err) = &result {
            if err.is_server_fault() {
                self.metrics.increment_failed();
                warn!(
                    breaker = breaker.name(),
                    state = ?breaker.state(),
                    code = err.code(),
                    error = %err,
                    "operation failed"
                );
            } else {
                self.metrics.increment_rejected();
            }
        }
        result
    }
}
