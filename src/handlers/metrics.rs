use axum::{extract::State, response::Json};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::services::GuardedPaymentService;

pub async fn get_metrics(State(service): State<Arc<GuardedPaymentService>>) -> Json<Value> {
    let circuit_breakers: Map<String, Value> = service
        .breaker_states()
        .into_iter()
        .map(|(operation, state)| (operation.to_string(), json!(state)))
        .collect();

    Json(json!({
        "payments": service.metrics(),
        "circuit_breakers": circuit_breakers,
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
