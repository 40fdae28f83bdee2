use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    routing::{get, post},
    Router,
};

use crate::app::errors;
use crate::app::routes::common::respond;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/active", get(active_shift))
        .route("/start", post(start_shift))
        .route("/end", post(end_shift))
}

/// `null` when no shift is open.
pub async fn active_shift(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.warehouse.active_shift().await {
        Ok(shift) => respond(StatusCode::OK, shift),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn start_shift(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.warehouse.start_shift().await {
        Ok(shift) => respond(StatusCode::CREATED, shift),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn end_shift(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.warehouse.end_shift().await {
        Ok(shift) => respond(StatusCode::OK, shift),
        Err(e) => errors::service_error_to_response(e),
    }
}
