use std::str::FromStr;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use stockroom_core::DomainError;

use crate::app::errors;

/// Parse a path id, answering `400 invalid_id` on failure.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.trim().parse().map_err(errors::domain_error_to_response)
}

pub fn respond<T: Serialize>(status: StatusCode, body: T) -> axum::response::Response {
    (status, Json(body)).into_response()
}
