use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockroom_core::SupplyId;

use crate::app::routes::common::{parse_id, respond};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_supply).get(list_supplies))
        .route("/:id", get(get_supply).delete(delete_supply))
        .route("/:id/process", post(process_supply))
}

pub async fn register_supply(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::SupplyRequest>,
) -> axum::response::Response {
    let lines = match dto::parse_lines(body.lines) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.warehouse.register_supply(body.supplier, lines).await {
        Ok(supply) => respond(StatusCode::CREATED, dto::SupplyResponse::from(&supply)),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_supplies(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::SearchQuery>,
) -> axum::response::Response {
    match services.warehouse.list_supplies(query.search).await {
        Ok(supplies) => respond(
            StatusCode::OK,
            supplies.iter().map(dto::SupplyResponse::from).collect::<Vec<_>>(),
        ),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_supply(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let supply_id: SupplyId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    match services.warehouse.get_supply(supply_id).await {
        Ok(supply) => respond(StatusCode::OK, dto::SupplyResponse::from(&supply)),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Receive the supply into stock. A second call answers `409 already_processed`.
pub async fn process_supply(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let supply_id: SupplyId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    match services
        .warehouse
        .process_supply(actor.actor_id(), supply_id)
        .await
    {
        Ok(supply) => respond(StatusCode::OK, dto::SupplyResponse::from(&supply)),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_supply(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let supply_id: SupplyId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    match services.warehouse.delete_supply(supply_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
