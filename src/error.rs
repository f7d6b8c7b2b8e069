use crate::models::payment::{PaymentId, ProductId};
use crate::services::payment_store::StoreError;
use thiserror::Error;

/// Client-caused rejection of a payment request. Raised before any transaction opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("product_id, quantity and payment_method are required")]
    MissingFields,
    #[error("product_id must be a positive integer")]
    InvalidProductId,
    #[error("quantity must be a number greater than 0")]
    InvalidQuantity,
    #[error("payment_method is not valid")]
    InvalidPaymentMethod,
    #[error("product price must be a positive number")]
    InvalidPrice,
    #[error("payment id must be an integer")]
    InvalidPaymentId,
    #[error("request body must be a JSON object")]
    InvalidBody,
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFields => "MISSING_FIELDS",
            Self::InvalidProductId => "INVALID_PRODUCT_ID",
            Self::InvalidQuantity => "INVALID_QUANTITY",
            Self::InvalidPaymentMethod => "INVALID_PAYMENT_METHOD",
            Self::InvalidPrice => "INVALID_PRICE",
            Self::InvalidPaymentId => "INVALID_PAYMENT_ID",
            Self::InvalidBody => "INVALID_BODY",
        }
    }
}

/// Every failure the payment operations can surface to a caller.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("payment {0} not found")]
    NotFound(PaymentId),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("circuit breaker for {0} is open")]
    CircuitOpen(&'static str),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("failed to retrieve payments")]
    Retrieval(#[source] StoreError),

    #[error("failed to process payment")]
    Processing(#[source] StoreError),

    #[error("failed to revert payment")]
    Revert(#[source] StoreError),
}

impl PaymentError {
    /// Stable machine-checkable code carried in every error response.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::NotFound(_) => "PAYMENT_NOT_FOUND",
            Self::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            Self::CircuitOpen(_) => "CIRCUIT_OPEN",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Retrieval(_) => "RETRIEVAL_ERROR",
            Self::Processing(_) => "PROCESSING_ERROR",
            Self::Revert(_) => "REVERT_ERROR",
        }
    }

    /// HTTP-equivalent status of this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) | Self::ProductNotFound(_) => 404,
            Self::CircuitOpen(_) | Self::ServiceUnavailable(_) => 503,
            Self::Retrieval(_) | Self::Processing(_) | Self::Revert(_) => 500,
        }
    }

    /// Whether the failure lies with this service or its dependencies rather than the caller.
    /// Only these count against a circuit breaker.
    pub fn is_server_fault(&self) -> bool {
        self.status_code() >= 500
    }

    pub fn is_invalid_price(&self) -> bool {
        matches!(self, Self::Validation(ValidationError::InvalidPrice))
    }

    /// Opaque detail for server errors: the full source chain, for logging only.
    pub fn detail(&self) -> Option<String> {
        if !self.is_server_fault() {
            return None;
        }
        let mut detail = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        Some(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_map_to_bad_request() {
        let err = PaymentError::from(ValidationError::InvalidQuantity);
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.code(), "INVALID_QUANTITY");
        assert!(!err.is_server_fault());
        assert!(err.detail().is_none());
    }

    #[test]
    fn test_malformed_requests_are_client_errors() {
        for (err, code) in [
            (ValidationError::InvalidPaymentId, "INVALID_PAYMENT_ID"),
            (ValidationError::InvalidBody, "INVALID_BODY"),
        ] {
            let err = PaymentError::from(err);
            assert_eq!(err.code(), code);
            assert_eq!(err.status_code(), 400);
            assert!(!err.is_server_fault());
        }
    }

    #[test]
    fn test_store_failures_carry_detail() {
        let err = PaymentError::Processing(StoreError::Unavailable("connection refused".into()));
        assert_eq!(err.status_code(), 500);
        assert!(err.is_server_fault());
        let detail = err.detail().unwrap();
        assert!(detail.starts_with("failed to process payment"));
        assert!(detail.contains("connection refused"));
    }

    #[test]
    fn test_not_found_kinds_are_distinct() {
        assert_eq!(PaymentError::NotFound(1).code(), "PAYMENT_NOT_FOUND");
        assert_eq!(PaymentError::ProductNotFound(1).code(), "PRODUCT_NOT_FOUND");
        assert_eq!(PaymentError::CircuitOpen("process_payment").status_code(), 503);
    }
}
