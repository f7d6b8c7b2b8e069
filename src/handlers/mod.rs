pub mod metrics;
pub mod payments;
