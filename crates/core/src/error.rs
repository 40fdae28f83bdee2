//! Domain error model.

use thiserror::Error;

use crate::id::ProductId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, stock rules, lifecycle). Infrastructure concerns belong elsewhere.
///
/// Every variant is detected before any stock mutation happens, so returning
/// one of these from inside a store transaction always aborts it cleanly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. missing driver on ship, empty customer).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("{0} not found")]
    NotFound(String),

    /// A conflict occurred (unique constraint, protected reference).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Requested (or delta) quantity exceeds the product's balance.
    #[error(
        "insufficient stock for '{product}': requested {requested}, available {available}"
    )]
    InsufficientStock {
        product: String,
        requested: i64,
        available: i64,
    },

    /// Same product submitted twice in one line set.
    #[error("duplicate line item for product {0}")]
    DuplicateLineItem(ProductId),

    /// Immediate order (or shift end) without an open shift.
    #[error("no active shift")]
    NoActiveShift,

    /// Shift start while another shift is open.
    #[error("a shift is already active")]
    AlreadyActive,

    /// Operation not valid for the current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Supply already completed.
    #[error("supply has already been processed")]
    AlreadyProcessed,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Stable, machine-readable error code (used by the HTTP layer).
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "conflict",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::DuplicateLineItem(_) => "duplicate_line_item",
            DomainError::NoActiveShift => "no_active_shift",
            DomainError::AlreadyActive => "already_active",
            DomainError::InvalidState(_) => "invalid_state",
            DomainError::AlreadyProcessed => "already_processed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_message_names_product_and_quantities() {
        let err = DomainError::InsufficientStock {
            product: "Cardboard box".to_string(),
            requested: 30,
            available: 12,
        };
        assert_eq!(
            err.to_string(),
            "insufficient stock for 'Cardboard box': requested 30, available 12"
        );
        assert_eq!(err.code(), "insufficient_stock");
    }

    #[test]
    fn codes_are_distinct_per_kind() {
        let kinds = [
            DomainError::validation("x"),
            DomainError::NoActiveShift,
            DomainError::AlreadyActive,
            DomainError::invalid_state("x"),
            DomainError::AlreadyProcessed,
            DomainError::not_found("order"),
        ];
        let mut codes: Vec<_> = kinds.iter().map(|k| k.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }
}
