use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::{PaymentError, ValidationError};
use crate::models::payment::{PaymentId, PaymentRequest};
use crate::services::GuardedPaymentService;

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let detail = self.detail();
        if let Some(detail) = &detail {
            error!(code = self.code(), %detail, "request failed");
        }
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            detail,
        };
        (status, Json(body)).into_response()
    }
}

// Extractor rejections answer with the same `{code, message}` body as every other error.
fn invalid_payment_id(rejection: PathRejection) -> PaymentError {
    debug!(%rejection, "rejected payment id");
    ValidationError::InvalidPaymentId.into()
}

fn invalid_body(rejection: JsonRejection) -> PaymentError {
    debug!(%rejection, "rejected request body");
    ValidationError::InvalidBody.into()
}

pub async fn list_payments(
    State(service): State<Arc<GuardedPaymentService>>,
) -> Result<Json<Value>, PaymentError> {
    let payments = service.list_payments().await?;
    Ok(Json(json!({ "data": payments })))
}

pub async fn get_payment(
    State(service): State<Arc<GuardedPaymentService>>,
    id: Result<Path<PaymentId>, PathRejection>,
) -> Result<Response, PaymentError> {
    let Path(id) = id.map_err(invalid_payment_id)?;
    match service.get_payment(id).await? {
        Some(payment) => Ok(Json(payment).into_response()),
        None => Err(PaymentError::NotFound(id)),
    }
}

pub async fn create_payment(
    State(service): State<Arc<GuardedPaymentService>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, PaymentError> {
    let Json(payload) = payload.map_err(invalid_body)?;
    // Fields that are present but mistyped still deserialize here; the gate below rejects them.
    let request: PaymentRequest = serde_json::from_value(payload).unwrap_or_default();
    let order = request.into_order()?;

    let payment = service.create_payment(order).await?;
    info!(payment_id = payment.id, "payment accepted");
    Ok((StatusCode::CREATED, Json(payment)).into_response())
}

pub async fn compensate_payment(
    State(service): State<Arc<GuardedPaymentService>>,
    payment_id: Result<Path<PaymentId>, PathRejection>,
) -> Result<Json<Value>, PaymentError> {
    let Path(payment_id) = payment_id.map_err(invalid_payment_id)?;
    let message = service.compensate_payment(payment_id).await?;
    Ok(Json(json!({ "message": message })))
}
