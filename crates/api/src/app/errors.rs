use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use evento_core::{DomainError, Resource};
use evento_infra::ServiceError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        ServiceError::InvalidOrder(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_order", message)
        }
        ServiceError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        ServiceError::InsufficientInventory { .. } => {
            json_error(StatusCode::CONFLICT, "insufficient_inventory", message)
        }
        ServiceError::InsufficientBalance { .. } => {
            json_error(StatusCode::CONFLICT, "insufficient_balance", message)
        }
        ServiceError::NotFound(resource) => json_error(
            StatusCode::NOT_FOUND,
            match resource {
                Resource::Customer(_) => "customer_not_found",
                Resource::TicketType(_) => "ticket_type_not_found",
                Resource::Order(_) => "order_not_found",
            },
            message,
        ),
        ServiceError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        ServiceError::Transient(_) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "temporarily_unavailable",
            "the ledger is busy; retry later",
        ),
        ServiceError::Internal(detail) => {
            tracing::error!(error = %detail, "request failed with internal error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
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

pub const INVALID_ORDER_BODY: (StatusCode, &str) = (StatusCode::UNPROCESSABLE_ENTITY, "invalid_order");
pub const INVALID_REQUEST_BODY: (StatusCode, &str) = (StatusCode::BAD_REQUEST, "validation_error");

/// Map a rejected JSON body to the standard error shape.
///
/// Bodies that parse but do not fit the request type get `invalid`; bodies
/// that are not JSON at all get a 400 `invalid_body`.
pub fn json_rejection_to_response(
    rejection: JsonRejection,
    invalid: (StatusCode, &'static str),
) -> axum::response::Response {
    let message = rejection.body_text();
    match rejection {
        JsonRejection::JsonDataError(_) => json_error(invalid.0, invalid.1, message),
        _ => json_error(StatusCode::BAD_REQUEST, "invalid_body", message),
    }
}

/// Parse a path id, rejecting garbage and non-positive values with a 400.
pub fn parse_id<T>(raw: &str, what: &'static str) -> Result<T, axum::response::Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}
