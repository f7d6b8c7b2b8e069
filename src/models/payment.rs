use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub type PaymentId = i64;
pub type ProductId = i64;

/// Accepted payment methods. The wire literals are fixed and matched exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "tarjeta")]
    Card,
    #[serde(rename = "paypal")]
    Paypal,
    #[serde(rename = "transferencia bancaria")]
    BankTransfer,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [Self::Card, Self::Paypal, Self::BankTransfer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "tarjeta",
            Self::Paypal => "paypal",
            Self::BankTransfer => "transferencia bancaria",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or(ValidationError::InvalidPaymentMethod)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed purchase. Immutable once stored; compensation deletes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub product_id: ProductId,
    pub price: f64,
    pub payment_method: PaymentMethod,
}

/// Row to insert; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub product_id: ProductId,
    pub price: f64,
    pub payment_method: PaymentMethod,
}

impl NewPayment {
    pub fn with_id(self, id: PaymentId) -> Payment {
        Payment {
            id,
            product_id: self.product_id,
            price: self.price,
            payment_method: self.payment_method,
        }
    }
}

/// Body of `POST /payments` as received. Fields stay untyped so that absent and
/// mistyped values map to distinct validation errors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentRequest {
    #[serde(default)]
    pub product_id: Option<Value>,
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default)]
    pub payment_method: Option<Value>,
}

/// Payment request that passed the shape gate, still to be validated for range.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOrder {
    pub product_id: ProductId,
    pub quantity: f64,
    pub payment_method: String,
}

impl PaymentRequest {
    pub fn into_order(self) -> Result<PaymentOrder, ValidationError> {
        let (Some(product_id), Some(quantity), Some(payment_method)) =
            (self.product_id, self.quantity, self.payment_method)
        else {
            return Err(ValidationError::MissingFields);
        };
        if product_id.is_null() || quantity.is_null() || payment_method.is_null() {
            return Err(ValidationError::MissingFields);
        }

        let product_id = integer_of(&product_id).ok_or(ValidationError::InvalidProductId)?;
        let quantity = number_of(&quantity).ok_or(ValidationError::InvalidQuantity)?;
        let payment_method = match payment_method {
            Value::String(s) if s.is_empty() => return Err(ValidationError::MissingFields),
            Value::String(s) => s,
            _ => return Err(ValidationError::InvalidPaymentMethod),
        };

        Ok(PaymentOrder {
            product_id,
            quantity,
            payment_method,
        })
    }
}

// Numeric strings are accepted, matching what form-encoded clients send.
fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn integer_of(value: &Value) -> Option<i64> {
    if let Value::Number(n) = value {
        if let Some(i) = n.as_i64() {
            return Some(i);
        }
    }
    let n = number_of(value)?;
    if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Some(n as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> PaymentRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_payment_method_literals() {
        assert_eq!("tarjeta".parse::<PaymentMethod>(), Ok(PaymentMethod::Card));
        assert_eq!("paypal".parse::<PaymentMethod>(), Ok(PaymentMethod::Paypal));
        assert_eq!(
            "transferencia bancaria".parse::<PaymentMethod>(),
            Ok(PaymentMethod::BankTransfer)
        );
        assert_eq!(
            "Tarjeta".parse::<PaymentMethod>(),
            Err(ValidationError::InvalidPaymentMethod)
        );
        assert_eq!(
            serde_json::to_value(PaymentMethod::BankTransfer).unwrap(),
            json!("transferencia bancaria")
        );
    }

    #[test]
    fn test_request_gate_accepts_well_formed_body() {
        let order = request(json!({"product_id": 1, "quantity": 2, "payment_method": "tarjeta"}))
            .into_order()
            .unwrap();
        assert_eq!(order.product_id, 1);
        assert_eq!(order.quantity, 2.0);
        assert_eq!(order.payment_method, "tarjeta");
    }

    #[test]
    fn test_request_gate_missing_fields() {
        let cases = [
            json!({}),
            json!({"quantity": 2, "payment_method": "paypal"}),
            json!({"product_id": 1, "payment_method": "paypal"}),
            json!({"product_id": 1, "quantity": 2}),
            json!({"product_id": null, "quantity": 2, "payment_method": "paypal"}),
            json!({"product_id": 1, "quantity": 2, "payment_method": ""}),
        ];
        for body in cases {
            assert_eq!(
                request(body.clone()).into_order(),
                Err(ValidationError::MissingFields),
                "{body}"
            );
        }
    }

    #[test]
    fn test_request_gate_mistyped_fields() {
        assert_eq!(
            request(json!({"product_id": "abc", "quantity": 2, "payment_method": "paypal"}))
                .into_order(),
            Err(ValidationError::InvalidProductId)
        );
        assert_eq!(
            request(json!({"product_id": 1.5, "quantity": 2, "payment_method": "paypal"}))
                .into_order(),
            Err(ValidationError::InvalidProductId)
        );
        assert_eq!(
            request(json!({"product_id": 1, "quantity": "two", "payment_method": "paypal"}))
                .into_order(),
            Err(ValidationError::InvalidQuantity)
        );
        assert_eq!(
            request(json!({"product_id": 1, "quantity": 2, "payment_method": 7})).into_order(),
            Err(ValidationError::InvalidPaymentMethod)
        );
    }

    #[test]
    fn test_request_gate_accepts_numeric_strings() {
        let order = request(json!({"product_id": "3", "quantity": "1.5", "payment_method": "paypal"}))
            .into_order()
            .unwrap();
        assert_eq!(order.product_id, 3);
        assert_eq!(order.quantity, 1.5);
    }
}
