use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, DriverId};

/// A driver who can take a loaded order out of the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub name: String,
}

impl Driver {
    pub fn register(id: DriverId, name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("driver name cannot be empty"));
        }
        Ok(Self { id, name })
    }
}
