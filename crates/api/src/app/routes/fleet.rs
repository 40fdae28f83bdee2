use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post},
    Json, Router,
};

use stockroom_core::{CarId, DriverId};

use crate::app::routes::common::{parse_id, respond};
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn drivers_router() -> Router {
    Router::new()
        .route("/", post(register_driver).get(list_drivers))
        .route("/:id", delete(delete_driver))
}

pub fn cars_router() -> Router {
    Router::new()
        .route("/", post(register_car).get(list_cars))
        .route("/:id", delete(delete_car))
}

pub async fn register_driver(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterDriverRequest>,
) -> axum::response::Response {
    match services.warehouse.register_driver(body.name).await {
        Ok(driver) => respond(StatusCode::CREATED, driver),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_drivers(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.warehouse.list_drivers().await {
        Ok(drivers) => respond(StatusCode::OK, drivers),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Orders that named the driver keep existing with the reference cleared.
pub async fn delete_driver(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let driver_id: DriverId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    match services.warehouse.delete_driver(driver_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn register_car(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterCarRequest>,
) -> axum::response::Response {
    match services.warehouse.register_car(body.number).await {
        Ok(car) => respond(StatusCode::CREATED, car),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_cars(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.warehouse.list_cars().await {
        Ok(cars) => respond(StatusCode::OK, cars),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_car(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let car_id: CarId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    match services.warehouse.delete_car(car_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
