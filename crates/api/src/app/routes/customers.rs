use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};

use evento_core::CustomerId;
use evento_infra::ServiceError;

use crate::app::services::AppServices;
use crate::app::{credentials, dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_customers).post(register_customer))
        .route("/:id", get(get_customer))
        .route("/:id/balances", patch(adjust_balance))
}

pub async fn list_customers(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.customers_with_orders().await {
        Ok(views) => {
            let body: Vec<dto::CustomerResponse> = views
                .into_iter()
                .map(|view| dto::CustomerResponse {
                    customer: view.customer,
                    orders: view.orders,
                })
                .collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Register a customer with a zero balance.
pub async fn register_customer(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RegisterCustomerRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_rejection_to_response(rejection, errors::INVALID_REQUEST_BODY)
        }
    };
    let (mut customer, password) = match body.validate() {
        Ok(parts) => parts,
        Err(e) => return errors::service_error_to_response(e.into()),
    };
    customer.credential_hash = match credentials::hash_password_blocking(password).await {
        Ok(hash) => hash,
        Err(detail) => return errors::service_error_to_response(ServiceError::Internal(detail)),
    };

    match services.register_customer(customer).await {
        Ok(customer) => (StatusCode::CREATED, Json(customer)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: CustomerId = match errors::parse_id(&id, "customer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.customer_with_orders(id).await {
        Ok(view) => (
            StatusCode::OK,
            Json(dto::CustomerResponse {
                customer: view.customer,
                orders: view.orders,
            }),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Test hook: add to or deduct from a balance directly.
pub async fn adjust_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::AdjustBalanceRequest>, JsonRejection>,
) -> axum::response::Response {
    let id: CustomerId = match errors::parse_id(&id, "customer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_rejection_to_response(rejection, errors::INVALID_REQUEST_BODY)
        }
    };
    let (action, amount) = match body.into_parts() {
        Ok(parts) => parts,
        Err(e) => return errors::service_error_to_response(e.into()),
    };

    match services.adjust_customer_balance(id, action, amount).await {
        Ok(customer) => (StatusCode::OK, Json(customer)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
