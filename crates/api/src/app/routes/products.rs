use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use stockroom_core::{DomainError, ProductId};
use stockroom_infra::{NewProduct, Pagination};

use crate::app::routes::common::{parse_id, respond};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/delete", post(delete_products))
        .route("/:id", get(get_product).put(update_product))
        .route("/:id/adjust", post(adjust_stock))
        .route("/:id/history", get(product_history))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::CreateProductRequest>,
) -> axum::response::Response {
    let new = NewProduct {
        details: body.details.into_details(),
        initial_stock: body.initial_stock,
    };
    match services.warehouse.create_product(actor.actor_id(), new).await {
        Ok(product) => respond(StatusCode::CREATED, dto::ProductResponse::from(&product)),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Search by name or company; includes the grand total of units.
pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::SearchQuery>,
) -> axum::response::Response {
    match services.warehouse.list_products(query.search).await {
        Ok(listing) => respond(
            StatusCode::OK,
            dto::ProductListResponse {
                products: listing.products.iter().map(dto::ProductResponse::from).collect(),
                total_units: listing.total_units,
            },
        ),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    match services.warehouse.get_product(product_id).await {
        Ok(product) => respond(StatusCode::OK, dto::ProductResponse::from(&product)),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ProductDetailsRequest>,
) -> axum::response::Response {
    let product_id: ProductId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    match services
        .warehouse
        .update_product(product_id, body.into_details())
        .await
    {
        Ok(product) => respond(StatusCode::OK, dto::ProductResponse::from(&product)),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response {
    let product_id: ProductId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    match services
        .warehouse
        .adjust_stock(actor.actor_id(), product_id, body.change, body.note)
        .await
    {
        Ok(product) => respond(StatusCode::OK, dto::ProductResponse::from(&product)),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Ledger entries for the product, newest first.
pub async fn product_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<dto::HistoryQuery>,
) -> axum::response::Response {
    let product_id: ProductId = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    let page = Pagination::new(query.limit, query.offset);
    match services.warehouse.product_history(product_id, page).await {
        Ok(entries) => respond(StatusCode::OK, entries),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_products(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::DeleteProductsRequest>,
) -> axum::response::Response {
    let ids: Result<Vec<ProductId>, DomainError> = body.ids.iter().map(|s| s.trim().parse()).collect();
    let ids = match ids {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.warehouse.delete_products(&ids).await {
        Ok(deleted) => respond(StatusCode::OK, serde_json::json!({ "deleted": deleted })),
        Err(e) => errors::service_error_to_response(e),
    }
}
