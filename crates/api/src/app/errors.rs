use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use canopy_core::DomainError;
use canopy_infra::workflows::FulfillmentError;

/// Map a workflow failure onto the wire contract.
///
/// Stock shortfalls and the idempotency rejections carry the structured
/// detail callers act on (failing product, exact shortage, error code).
pub fn fulfillment_error_to_response(err: FulfillmentError) -> axum::response::Response {
    match err {
        FulfillmentError::Insufficient {
            product_id,
            product_name,
            shortage,
            ..
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "Stock Required",
                "productId": product_id.to_string(),
                "productName": product_name,
                "shortage": shortage,
            })),
        )
            .into_response(),
        FulfillmentError::ColdLeadBlocked => (
            StatusCode::FORBIDDEN,
            axum::Json(json!({
                "error": "Cold lead - actions disabled",
                "code": "COLD_LEAD",
            })),
        )
            .into_response(),
        FulfillmentError::AlreadyReturnedLine(product_id) => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "Line already fully returned",
                "code": "ALREADY_RETURNED_LINE",
                "productId": product_id.to_string(),
            })),
        )
            .into_response(),
        FulfillmentError::AlreadyReturned => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "Event already fully returned",
                "code": "ALREADY_RETURNED",
            })),
        )
            .into_response(),
        FulfillmentError::InvalidQuantity(msg) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_quantity", msg)
        }
        FulfillmentError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        FulfillmentError::InvalidState(msg) => {
            json_error(StatusCode::CONFLICT, "invalid_state", msg)
        }
        FulfillmentError::Transient(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "transient_conflict", msg)
        }
        FulfillmentError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
