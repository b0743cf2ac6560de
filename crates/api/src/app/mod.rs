//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: ledger backend selection and the operations handlers call
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses
//! - `credentials.rs`: password hashing for registration

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod credentials;
pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Facts about the running server that handlers may report.
#[derive(Debug, Clone, Copy)]
pub struct ServerInfo {
    pub port: u16,
}

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<AppServices>, port: u16) -> Router {
    Router::new()
        .nest("/api", routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_logger))
                .layer(Extension(services))
                .layer(Extension(ServerInfo { port })),
        )
}
