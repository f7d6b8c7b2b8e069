use crate::services::circuit_breaker::BreakerConfig;
use crate::services::retry::{Backoff, RetryPolicy};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("PRODUCT_SERVICE_URL is not a valid URL: {0}")]
    InvalidProductServiceUrl(String),
    #[error("CIRCUIT_BREAKER_ERROR_PERCENTAGE must be between 1 and 100, got {0}")]
    InvalidErrorPercentage(u8),
    #[error("CIRCUIT_BREAKER_WINDOW must be greater than 0")]
    EmptyRollingWindow,
    #[error(
        "retry backoff of up to {retry_delay_ms}ms does not fit in CIRCUIT_BREAKER_CALL_TIMEOUT ({call_timeout_ms}ms)"
    )]
    RetryBudgetExceedsCallTimeout {
        retry_delay_ms: u64,
        call_timeout_ms: u64,
    },
    #[error(
        "PRODUCT_SERVICE_TIMEOUT ({request_timeout_ms}ms) exceeds CIRCUIT_BREAKER_CALL_TIMEOUT ({call_timeout_ms}ms)"
    )]
    RequestTimeoutExceedsCallTimeout {
        request_timeout_ms: u64,
        call_timeout_ms: u64,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub product_service_url: String,
    pub product_service_timeout_ms: u64,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub retry_backoff: Backoff,
    pub retry_deadline_ms: Option<u64>,
    pub cache_expiry_secs: u64,
    pub cache_http_responses: bool,
    pub redis_url: Option<String>,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_error_percentage: u8,
    pub circuit_breaker_timeout_secs: u64,
    pub circuit_breaker_call_timeout_ms: u64,
    pub circuit_breaker_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 4003,
            product_service_url: "http://ms-catalog_app:4001/api/product".to_string(),
            product_service_timeout_ms: 5000,
            retry_count: 3,
            retry_delay_ms: 1000,
            retry_backoff: Backoff::Linear,
            retry_deadline_ms: None,
            cache_expiry_secs: 3600,
            cache_http_responses: false,
            redis_url: None,
            circuit_breaker_threshold: 5,
            circuit_breaker_error_percentage: 50,
            circuit_breaker_timeout_secs: 30,
            circuit_breaker_call_timeout_ms: 10_000,
            circuit_breaker_window_secs: 10,
        }
    }
}

fn var_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn optional_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: var_or("PORT", defaults.server_port),
            product_service_url: env::var("PRODUCT_SERVICE_URL")
                .unwrap_or(defaults.product_service_url),
            product_service_timeout_ms: var_or(
                "PRODUCT_SERVICE_TIMEOUT",
                defaults.product_service_timeout_ms,
            ),
            retry_count: var_or("RETRY_COUNT", defaults.retry_count),
            retry_delay_ms: var_or("RETRY_DELAY", defaults.retry_delay_ms),
            retry_backoff: match env::var("RETRY_BACKOFF").as_deref() {
                Ok("exponential") => Backoff::Exponential,
                _ => defaults.retry_backoff,
            },
            retry_deadline_ms: optional_var("RETRY_DEADLINE"),
            cache_expiry_secs: var_or("CACHE_EXPIRY", defaults.cache_expiry_secs),
            cache_http_responses: var_or("CACHE_HTTP_RESPONSES", defaults.cache_http_responses),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            circuit_breaker_threshold: var_or(
                "CIRCUIT_BREAKER_THRESHOLD",
                defaults.circuit_breaker_threshold,
            ),
            circuit_breaker_error_percentage: var_or(
                "CIRCUIT_BREAKER_ERROR_PERCENTAGE",
                defaults.circuit_breaker_error_percentage,
            ),
            circuit_breaker_timeout_secs: var_or(
                "CIRCUIT_BREAKER_TIMEOUT",
                defaults.circuit_breaker_timeout_secs,
            ),
            circuit_breaker_call_timeout_ms: var_or(
                "CIRCUIT_BREAKER_CALL_TIMEOUT",
                defaults.circuit_breaker_call_timeout_ms,
            ),
            circuit_breaker_window_secs: var_or(
                "CIRCUIT_BREAKER_WINDOW",
                defaults.circuit_breaker_window_secs,
            ),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.product_service_url)
            .map_err(|e| ConfigError::InvalidProductServiceUrl(e.to_string()))?;
        if !(1..=100).contains(&self.circuit_breaker_error_percentage) {
            return Err(ConfigError::InvalidErrorPercentage(
                self.circuit_breaker_error_percentage,
            ));
        }
        if self.circuit_breaker_window_secs == 0 {
            return Err(ConfigError::EmptyRollingWindow);
        }

        // The create path runs every product lookup retry inside one breaker call.
        let call_timeout_ms = self.circuit_breaker_call_timeout_ms;
        if self.product_service_timeout_ms > call_timeout_ms {
            return Err(ConfigError::RequestTimeoutExceedsCallTimeout {
                request_timeout_ms: self.product_service_timeout_ms,
                call_timeout_ms,
            });
        }
        let retry_delay_ms = RetryPolicy::from(self).max_total_delay().as_millis() as u64;
        if retry_delay_ms >= call_timeout_ms {
            return Err(ConfigError::RetryBudgetExceedsCallTimeout {
                retry_delay_ms,
                call_timeout_ms,
            });
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_call_timeout_ms)
    }

    pub fn product_service_timeout(&self) -> Duration {
        Duration::from_millis(self.product_service_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_expiry_secs)
    }
}

/// The deadline never outlasts the breaker call timeout, so retries stop with the last
/// upstream error instead of being cancelled mid-flight.
impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        let base_delay = Duration::from_millis(config.retry_delay_ms);
        let policy = match config.retry_backoff {
            Backoff::Linear => RetryPolicy::linear(config.retry_count, base_delay),
            Backoff::Exponential => RetryPolicy::exponential(config.retry_count, base_delay),
        };
        let deadline = match config.retry_deadline_ms {
            Some(ms) => Duration::from_millis(ms).min(config.call_timeout()),
            None => config.call_timeout(),
        };
        policy.with_deadline(deadline)
    }
}

impl From<&Config> for BreakerConfig {
    fn from(config: &Config) -> Self {
        BreakerConfig {
            error_threshold_percentage: config.circuit_breaker_error_percentage,
            volume_threshold: config.circuit_breaker_threshold,
            rolling_window: Duration::from_secs(config.circuit_breaker_window_secs),
            reset_timeout: Duration::from_secs(config.circuit_breaker_timeout_secs),
            call_timeout: config.call_timeout(),
        }
    }
}
