//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store / clock wiring behind the warehouse service
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use stockroom_infra::{AppConfig, StoreError};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<Router, StoreError> {
    let services = services::build_services(config).await?;
    Ok(router_with(services))
}

/// Router over already-wired services (tests pin the clock this way).
pub fn router_with(services: services::AppServices) -> Router {
    let services = Arc::new(services);

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(Extension(services))
                .layer(axum::middleware::from_fn(middleware::actor_middleware)),
        )
}
