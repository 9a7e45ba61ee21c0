use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::error::ValidationError;
use crate::models::payment::PaymentRequest;
use crate::services::PaymentService;

pub async fn create_payment(
    State(service): State<Arc<PaymentService>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let request = payload
        .map_err(|e| ValidationError::Malformed(e.body_text()))
        .and_then(|Json(body)| parse_request(body));

    match request.and_then(|request| service.submit_payment(request)) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "accepted" })),
        ),
        Err(e) => {
            warn!("Invalid payment request: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}

fn parse_request(body: Value) -> Result<PaymentRequest, ValidationError> {
    match body.get("correlationId") {
        Some(Value::String(_)) => {}
        _ => return Err(ValidationError::MissingCorrelationId),
    }
    match body.get("amount") {
        Some(Value::Number(_)) => {}
        _ => return Err(ValidationError::InvalidAmount),
    }
    serde_json::from_value(body).map_err(|e| ValidationError::Malformed(e.to_string()))
}
