use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::ShiftId;

/// A bounded operational period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub id: ShiftId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl Shift {
    pub fn open(id: ShiftId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            ended_at: None,
            active: true,
        }
    }

    pub fn closed_at(&self, at: DateTime<Utc>) -> Self {
        Self {
            ended_at: Some(at),
            active: false,
            ..self.clone()
        }
    }
}
