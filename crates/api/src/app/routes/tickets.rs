use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};

use evento_core::TicketTypeId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_ticket_types))
        .route("/:id", get(get_ticket_type))
        .route("/:id/quantities", patch(adjust_quantity))
}

pub async fn list_ticket_types(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.ticket_types().await {
        Ok(ticket_types) => (StatusCode::OK, Json(ticket_types)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_ticket_type(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: TicketTypeId = match errors::parse_id(&id, "ticket type") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ticket_type(id).await {
        Ok(ticket_type) => (StatusCode::OK, Json(ticket_type)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Test hook: add or deduct quantity directly, through the same atomic
/// primitives orders use.
pub async fn adjust_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::AdjustQuantityRequest>, JsonRejection>,
) -> axum::response::Response {
    let id: TicketTypeId = match errors::parse_id(&id, "ticket type") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_rejection_to_response(rejection, errors::INVALID_REQUEST_BODY)
        }
    };
    let delta = match body.delta() {
        Ok(d) => d,
        Err(e) => return errors::service_error_to_response(e.into()),
    };

    match services.adjust_ticket_quantity(id, delta).await {
        Ok(ticket_type) => (StatusCode::OK, Json(ticket_type)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
