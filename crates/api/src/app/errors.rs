use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use stockroom_core::DomainError;
use stockroom_infra::{ServiceError, StoreError};

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Store(StoreError::Conflict(msg)) => {
            json_error(StatusCode::CONFLICT, "conflict", msg)
        }
        ServiceError::Store(e) => {
            error!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    json_error(status_for(&err), err.code(), err.to_string())
}

fn status_for(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Validation(_) | DomainError::InvalidId(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) | DomainError::AlreadyActive | DomainError::AlreadyProcessed => {
            StatusCode::CONFLICT
        }
        DomainError::InsufficientStock { .. }
        | DomainError::DuplicateLineItem(_)
        | DomainError::NoActiveShift
        | DomainError::InvalidState(_)
        | DomainError::InvariantViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
