use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockroom_core::OrderId;
use stockroom_infra::ServiceError;
use stockroom_orders::Order;

use crate::app::routes::common::{parse_id, respond};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/archived", get(list_archived_orders))
        .route(
            "/:id",
            get(get_order).put(edit_order).delete(purge_order),
        )
        .route("/:id/load", post(load_order))
        .route("/:id/reject-load", post(reject_load))
        .route("/:id/ship", post(ship_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/archive", post(archive_order))
}

fn order_response(result: Result<Order, ServiceError>, status: StatusCode) -> axum::response::Response {
    match result {
        Ok(order) => respond(status, dto::OrderResponse::from(&order)),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Place an order; its lines are reserved immediately.
pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::OrderRequest>,
) -> axum::response::Response {
    let draft = match body.into_draft() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    order_response(
        services.warehouse.create_order(actor.actor_id(), draft).await,
        StatusCode::CREATED,
    )
}

/// Non-archived orders grouped by delivery date.
pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::OrderListQuery>,
) -> axum::response::Response {
    match services
        .warehouse
        .list_orders(query.search, query.delivery_date)
        .await
    {
        Ok(groups) => respond(StatusCode::OK, dto::order_groups(groups)),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Archived orders grouped by delivery month, newest first.
pub async fn list_archived_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::OrderListQuery>,
) -> axum::response::Response {
    match services
        .warehouse
        .list_archived_orders(query.search, query.delivery_date)
        .await
    {
        Ok(groups) => respond(StatusCode::OK, dto::order_groups(groups)),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    order_response(services.warehouse.get_order(order_id).await, StatusCode::OK)
}

pub async fn edit_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::OrderRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    let draft = match body.into_draft() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    order_response(
        services
            .warehouse
            .edit_order(actor.actor_id(), order_id, draft)
            .await,
        StatusCode::OK,
    )
}

pub async fn load_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    order_response(
        services.warehouse.load_order(actor.actor_id(), order_id).await,
        StatusCode::OK,
    )
}

pub async fn reject_load(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    order_response(
        services.warehouse.reject_load(actor.actor_id(), order_id).await,
        StatusCode::OK,
    )
}

/// Body is optional; driver and car default to the ones on the order.
pub async fn ship_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ShipOrderRequest>>,
) -> axum::response::Response {
    let order_id: OrderId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let driver_id = match dto::parse_opt_id(body.driver_id.as_deref()) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let car_id = match dto::parse_opt_id(body.car_id.as_deref()) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    order_response(
        services
            .warehouse
            .ship_order(actor.actor_id(), order_id, driver_id, car_id)
            .await,
        StatusCode::OK,
    )
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    order_response(
        services.warehouse.cancel_order(actor.actor_id(), order_id).await,
        StatusCode::OK,
    )
}

pub async fn archive_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    order_response(
        services.warehouse.archive_order(actor.actor_id(), order_id).await,
        StatusCode::OK,
    )
}

/// Permanent delete; only cancelled orders qualify.
pub async fn purge_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    match services.warehouse.purge_order(actor.actor_id(), order_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
