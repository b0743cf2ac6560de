use axum::{routing::get, Router};

pub mod customers;
pub mod orders;
pub mod system;
pub mod tickets;

/// Router for everything under `/api`.
pub fn router() -> Router {
    Router::new()
        .route("/", get(system::index))
        .nest("/customers", customers::router())
        .nest("/tickets", tickets::router())
        .nest("/orders", orders::router())
}
