use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{Aggregate, AggregateRoot, DomainError, SupplyId};
use stockroom_events::Event;
use stockroom_inventory::{LineSet, Movement, StockLine};

/// Supply status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupplyStatus {
    Pending,
    Completed,
}

impl SupplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupplyStatus::Pending => "pending",
            SupplyStatus::Completed => "completed",
        }
    }
}

impl core::fmt::Display for SupplyStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for SupplyStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SupplyStatus::Pending),
            "completed" => Ok(SupplyStatus::Completed),
            other => Err(DomainError::validation(format!("unknown supply status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyState {
    pub supplier: String,
    pub status: SupplyStatus,
    pub lines: LineSet,
    pub created_at: DateTime<Utc>,
}

/// Aggregate root: Supply (an inbound delivery).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supply {
    id: SupplyId,
    state: SupplyState,
    version: u64,
    created: bool,
}

impl Supply {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: SupplyId) -> Self {
        Self {
            id,
            state: SupplyState {
                supplier: String::new(),
                status: SupplyStatus::Pending,
                lines: LineSet::empty(),
                created_at: DateTime::<Utc>::MIN_UTC,
            },
            version: 0,
            created: false,
        }
    }

    pub fn restore(id: SupplyId, state: SupplyState, version: u64) -> Self {
        Self {
            id,
            state,
            version,
            created: true,
        }
    }

    pub fn id_typed(&self) -> SupplyId {
        self.id
    }

    pub fn state(&self) -> &SupplyState {
        &self.state
    }

    pub fn status(&self) -> SupplyStatus {
        self.state.status
    }

    pub fn lines(&self) -> &LineSet {
        &self.state.lines
    }

    pub fn total_units(&self) -> i64 {
        self.state.lines.total_units()
    }
}

impl AggregateRoot for Supply {
    type Id = SupplyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterSupply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSupply {
    pub supply_id: SupplyId,
    pub supplier: String,
    pub lines: Vec<StockLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ProcessSupply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSupply {
    pub supply_id: SupplyId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteSupply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSupply {
    pub supply_id: SupplyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplyCommand {
    RegisterSupply(RegisterSupply),
    ProcessSupply(ProcessSupply),
    DeleteSupply(DeleteSupply),
}

/// Event: SupplyRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyRegistered {
    pub supply_id: SupplyId,
    pub supplier: String,
    pub lines: LineSet,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SupplyProcessed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyProcessed {
    pub supply_id: SupplyId,
    pub supplier: String,
    pub received: LineSet,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SupplyDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyDeleted {
    pub supply_id: SupplyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplyEvent {
    SupplyRegistered(SupplyRegistered),
    SupplyProcessed(SupplyProcessed),
    SupplyDeleted(SupplyDeleted),
}

impl SupplyEvent {
    /// One supply-in movement per received line.
    pub fn stock_movements(&self) -> Vec<Movement> {
        match self {
            SupplyEvent::SupplyProcessed(e) => e
                .received
                .to_lines()
                .into_iter()
                .map(|l| Movement::receive(l.product_id, l.quantity))
                .collect(),
            SupplyEvent::SupplyRegistered(_) | SupplyEvent::SupplyDeleted(_) => Vec::new(),
        }
    }

    pub fn ledger_note(&self) -> String {
        match self {
            SupplyEvent::SupplyProcessed(e) => format!("supply from {}", e.supplier),
            other => other.event_type().to_string(),
        }
    }
}

impl Event for SupplyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SupplyEvent::SupplyRegistered(_) => "supplies.supply.registered",
            SupplyEvent::SupplyProcessed(_) => "supplies.supply.processed",
            SupplyEvent::SupplyDeleted(_) => "supplies.supply.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SupplyEvent::SupplyRegistered(e) => e.occurred_at,
            SupplyEvent::SupplyProcessed(e) => e.occurred_at,
            SupplyEvent::SupplyDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Supply {
    type Command = SupplyCommand;
    type Event = SupplyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SupplyEvent::SupplyRegistered(e) => {
                self.id = e.supply_id;
                self.state = SupplyState {
                    supplier: e.supplier.clone(),
                    status: SupplyStatus::Pending,
                    lines: e.lines.clone(),
                    created_at: e.occurred_at,
                };
                self.created = true;
            }
            SupplyEvent::SupplyProcessed(_) => {
                self.state.status = SupplyStatus::Completed;
            }
            SupplyEvent::SupplyDeleted(_) => {
                self.created = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SupplyCommand::RegisterSupply(cmd) => self.handle_register(cmd),
            SupplyCommand::ProcessSupply(cmd) => {
                self.ensure_created(cmd.supply_id)?;
                if self.state.status == SupplyStatus::Completed {
                    return Err(DomainError::AlreadyProcessed);
                }
                Ok(vec![SupplyEvent::SupplyProcessed(SupplyProcessed {
                    supply_id: cmd.supply_id,
                    supplier: self.state.supplier.clone(),
                    received: self.state.lines.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            SupplyCommand::DeleteSupply(cmd) => {
                self.ensure_created(cmd.supply_id)?;
                if self.state.status != SupplyStatus::Pending {
                    return Err(DomainError::invalid_state(
                        "only pending supplies can be deleted",
                    ));
                }
                Ok(vec![SupplyEvent::SupplyDeleted(SupplyDeleted {
                    supply_id: cmd.supply_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Supply {
    fn ensure_created(&self, supply_id: SupplyId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("supply"));
        }
        if self.id != supply_id {
            return Err(DomainError::invariant("supply_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterSupply) -> Result<Vec<SupplyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("supply already exists"));
        }
        let supplier = cmd.supplier.trim();
        if supplier.is_empty() {
            return Err(DomainError::validation("supplier cannot be empty"));
        }
        let lines = LineSet::from_lines(&cmd.lines)?;
        if lines.is_empty() {
            return Err(DomainError::validation("a supply needs at least one line"));
        }

        Ok(vec![SupplyEvent::SupplyRegistered(SupplyRegistered {
            supply_id: cmd.supply_id,
            supplier: supplier.to_string(),
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }
}
