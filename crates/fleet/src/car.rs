use serde::{Deserialize, Serialize};

use stockroom_core::{CarId, DomainError, DomainResult};

/// A vehicle, identified to humans by its registration number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub id: CarId,
    pub number: String,
}

impl Car {
    /// Registration numbers are stored upper-cased without surrounding spaces,
    /// so uniqueness checks compare the normalized form.
    pub fn register(id: CarId, number: impl Into<String>) -> DomainResult<Self> {
        let number = normalize_number(&number.into());
        if number.is_empty() {
            return Err(DomainError::validation("car number cannot be empty"));
        }
        Ok(Self { id, number })
    }
}

pub fn normalize_number(raw: &str) -> String {
    raw.trim().to_uppercase()
}
