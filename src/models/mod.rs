pub mod payment;
pub mod product;

pub use payment::{NewPayment, Payment, PaymentId, PaymentMethod, PaymentOrder, PaymentRequest, ProductId};
pub use product::{CachedProduct, ProductEnvelope};
