use axum::Router;

pub mod common;
pub mod fleet;
pub mod orders;
pub mod products;
pub mod reports;
pub mod shifts;
pub mod supplies;
pub mod system;

/// Router for all warehouse endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/shifts", shifts::router())
        .nest("/products", products::router())
        .nest("/drivers", fleet::drivers_router())
        .nest("/cars", fleet::cars_router())
        .nest("/orders", orders::router())
        .nest("/supplies", supplies::router())
        .nest("/reports", reports::router())
}
