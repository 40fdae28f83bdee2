use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    routing::get,
    Router,
};

use stockroom_orders::SummaryPeriod;

use crate::app::routes::common::respond;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/order-summary", get(order_summary))
}

pub async fn order_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::SummaryQuery>,
) -> axum::response::Response {
    let period: SummaryPeriod = match query
        .period
        .as_deref()
        .map(str::parse::<SummaryPeriod>)
        .transpose()
    {
        Ok(p) => p.unwrap_or_default(),
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services
        .warehouse
        .order_summary(period, query.from, query.to)
        .await
    {
        Ok(rows) => respond(StatusCode::OK, rows),
        Err(e) => errors::service_error_to_response(e),
    }
}
