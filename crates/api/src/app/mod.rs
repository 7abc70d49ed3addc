//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/provider wiring from the environment
//! - `routes/`: HTTP routes and handlers, one file per area
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app() -> Router {
    let services = Arc::new(services::build_services().await);
    app_with_services(services)
}

/// Router over explicit services; lets tests wire in-memory stores.
pub fn app_with_services(services: Arc<services::AppServices>) -> Router {
    Router::new()
        .route("/healthz", get(routes::system::healthz))
        .merge(routes::router())
        .layer(Extension(services))
        .layer(axum::middleware::from_fn(middleware::initiator_middleware))
        .layer(ServiceBuilder::new())
}
