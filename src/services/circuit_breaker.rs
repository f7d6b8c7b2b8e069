use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failure percentage in the rolling window at which the circuit opens.
    pub error_threshold_percentage: u8,
    /// Minimum outcomes in the window before the failure rate is evaluated.
    pub volume_threshold: u32,
    pub rolling_window: Duration,
    /// Time spent open before a trial call is let through.
    pub reset_timeout: Duration,
    /// Calls running longer than this are abandoned and counted as failures.
    pub call_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold_percentage: 50,
            volume_threshold: 5,
            rolling_window: Duration::from_secs(10),
            reset_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker for {0} is open")]
    Open(&'static str),
    #[error("{name} timed out after {timeout:?}")]
    Timeout { name: &'static str, timeout: Duration },
    #[error("{0}")]
    Inner(E),
}

struct BreakerInner {
    state: CircuitState,
    /// `(recorded_at, failed)` for calls that finished while closed.
    outcomes: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Closed,
    Trial,
}

/// Failure-rate circuit breaker for a single operation.
pub struct CircuitBreaker {
    name: &'static str,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: BreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                outcomes: VecDeque::new(),
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Runs `operation` through the breaker; every error counts as a failure.
    pub async fn fire<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.fire_with(operation, |_| true).await
    }

    /// Runs `operation` through the breaker. Errors rejected by `counts_as_failure`
    /// are returned to the caller but recorded as successful calls.
    pub async fn fire_with<F, Fut, T, E, P>(
        &self,
        operation: F,
        counts_as_failure: P,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        let admission = self.admit().ok_or(BreakerError::Open(self.name))?;
        let mut call = CallGuard {
            breaker: self,
            admission,
            settled: false,
        };

        match tokio::time::timeout(self.config.call_timeout, operation()).await {
            Ok(Ok(value)) => {
                call.settle(false);
                Ok(value)
            }
            Ok(Err(err)) => {
                call.settle(counts_as_failure(&err));
                Err(BreakerError::Inner(err))
            }
            Err(_) => {
                call.settle(true);
                warn!(breaker = self.name, timeout_ms = self.config.call_timeout.as_millis() as u64, "call timed out");
                Err(BreakerError::Timeout {
                    name: self.name,
                    timeout: self.config.call_timeout,
                })
            }
        }
    }

    fn admit(&self) -> Option<Admission> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Some(Admission::Closed),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed < self.config.reset_timeout {
                    return None;
                }
                info!(breaker = self.name, "circuit half-open, letting a trial call through");
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                Some(Admission::Trial)
            }
            CircuitState::HalfOpen if inner.trial_in_flight => None,
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                Some(Admission::Trial)
            }
        }
    }

    fn record(&self, admission: Admission, failed: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        match admission {
            Admission::Trial => {
                inner.trial_in_flight = false;
                if failed {
                    self.open(&mut inner, now);
                } else {
                    info!(breaker = self.name, "trial call succeeded, circuit closed");
                    inner.state = CircuitState::Closed;
                    inner.opened_at = None;
                    inner.outcomes.clear();
                }
            }
            Admission::Closed => {
                // Another call may have opened the circuit while this one ran.
                if inner.state != CircuitState::Closed {
                    return;
                }
                inner.outcomes.push_back((now, failed));
                let window = self.config.rolling_window;
                while let Some(&(at, _)) = inner.outcomes.front() {
                    if now.duration_since(at) > window {
                        inner.outcomes.pop_front();
                    } else {
                        break;
                    }
                }

                let total = inner.outcomes.len() as u64;
                let failures = inner.outcomes.iter().filter(|(_, failed)| *failed).count() as u64;
                if failed
                    && total >= u64::from(self.config.volume_threshold)
                    && failures * 100 >= u64::from(self.config.error_threshold_percentage) * total
                {
                    self.open(&mut inner, now);
                }
            }
        }
    }

    fn open(&self, inner: &mut BreakerInner, now: Instant) {
        warn!(
            breaker = self.name,
            reset_timeout_secs = self.config.reset_timeout.as_secs(),
            "circuit opened"
        );
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.outcomes.clear();
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Records the outcome of an admitted call. A call dropped before it settles
/// (its caller was cancelled) counts as a failure, so a trial call can never stay in flight.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl CallGuard<'_> {
    fn settle(&mut self, failed: bool) {
        self.settled = true;
        self.breaker.record(self.admission, failed);
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record(self.admission, true);
        }
    }
}

/// Guarded service operations, one breaker each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ListPayments,
    GetPayment,
    ProcessPayment,
    CompensatePayment,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Self::ListPayments,
        Self::GetPayment,
        Self::ProcessPayment,
        Self::CompensatePayment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListPayments => "list_payments",
            Self::GetPayment => "get_payment",
            Self::ProcessPayment => "process_payment",
            Self::CompensatePayment => "compensate_payment",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Independent breakers for each [`Operation`], built once and injected where needed.
#[derive(Debug)]
pub struct BreakerRegistry {
    list_payments: CircuitBreaker,
    get_payment: CircuitBreaker,
    process_payment: CircuitBreaker,
    compensate_payment: CircuitBreaker,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        let breaker = |op: Operation| CircuitBreaker::new(op.as_str(), config.clone());
        Self {
            list_payments: breaker(Operation::ListPayments),
            get_payment: breaker(Operation::GetPayment),
            process_payment: breaker(Operation::ProcessPayment),
            compensate_payment: breaker(Operation::CompensatePayment),
        }
    }

    pub fn get(&self, operation: Operation) -> &CircuitBreaker {
        match operation {
            Operation::ListPayments => &self.list_payments,
            Operation::GetPayment => &self.get_payment,
            Operation::ProcessPayment => &self.process_payment,
            Operation::CompensatePayment => &self.compensate_payment,
        }
    }

    pub fn states(&self) -> Vec<(Operation, CircuitState)> {
        Operation::ALL
            .into_iter()
            .map(|op| (op, self.get(op).state()))
            .collect()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
