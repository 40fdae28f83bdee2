use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{
    Aggregate, AggregateRoot, CarId, DomainError, DomainResult, DriverId, OrderId, ShiftId,
};
use stockroom_events::Event;
use stockroom_inventory::{LineDelta, LineSet, Movement, StockLine};

use crate::permissions::{mutable_fields, OrderField};

/// Order status lifecycle.
///
/// `pending -> loaded -> shipped`, `loaded -> pending` (reject-load) and
/// `pending -> cancelled`. Archiving is a separate flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Loaded,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Loaded => "loaded",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "loaded" => Ok(OrderStatus::Loaded),
            "shipped" => Ok(OrderStatus::Shipped),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown order status '{other}'"))),
        }
    }
}

/// Attributes submitted when creating or editing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub customer: String,
    pub notes: Option<String>,
    pub delivery_date: NaiveDate,
    pub lines: Vec<StockLine>,
    pub driver_id: Option<DriverId>,
    pub car_id: Option<CarId>,
}

/// A draft after trimming and line validation.
struct CleanDraft {
    customer: String,
    notes: Option<String>,
    lines: LineSet,
}

impl OrderDraft {
    fn clean(&self) -> DomainResult<CleanDraft> {
        let customer = self.customer.trim().to_string();
        if customer.is_empty() {
            return Err(DomainError::validation("customer cannot be empty"));
        }
        let notes = self
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let lines = LineSet::from_lines(&self.lines)?;
        if lines.is_empty() {
            return Err(DomainError::validation("an order needs at least one line"));
        }
        Ok(CleanDraft {
            customer,
            notes,
            lines,
        })
    }
}

/// Persistent order state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderState {
    pub customer: String,
    pub notes: Option<String>,
    pub delivery_date: NaiveDate,
    pub shift_id: Option<ShiftId>,
    pub driver_id: Option<DriverId>,
    pub car_id: Option<CarId>,
    pub status: OrderStatus,
    pub archived: bool,
    /// Quantities currently reserved against stock.
    pub lines: LineSet,
    pub created_at: DateTime<Utc>,
}

impl OrderState {
    fn blank() -> Self {
        Self {
            customer: String::new(),
            notes: None,
            delivery_date: NaiveDate::MIN,
            shift_id: None,
            driver_id: None,
            car_id: None,
            status: OrderStatus::Pending,
            archived: false,
            lines: LineSet::empty(),
            created_at: DateTime::<Utc>::MIN_UTC,
        }
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    state: OrderState,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            state: OrderState::blank(),
            version: 0,
            created: false,
        }
    }

    /// Rebuild a stored order.
    pub fn restore(id: OrderId, state: OrderState, version: u64) -> Self {
        Self {
            id,
            state,
            version,
            created: true,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn state(&self) -> &OrderState {
        &self.state
    }

    pub fn status(&self) -> OrderStatus {
        self.state.status
    }

    pub fn is_archived(&self) -> bool {
        self.state.archived
    }

    pub fn lines(&self) -> &LineSet {
        &self.state.lines
    }

    pub fn total_units(&self) -> i64 {
        self.state.lines.total_units()
    }

    /// Shipped orders, plus loaded ones still on the board, count as sold.
    pub fn counts_toward_summary(&self) -> bool {
        match self.state.status {
            OrderStatus::Shipped => true,
            OrderStatus::Loaded => !self.state.archived,
            OrderStatus::Pending | OrderStatus::Cancelled => false,
        }
    }

    fn changed_fields(&self, draft: &OrderDraft, clean: &CleanDraft) -> Vec<OrderField> {
        let s = &self.state;
        let mut changed = Vec::new();
        if clean.customer != s.customer {
            changed.push(OrderField::Customer);
        }
        if clean.notes != s.notes {
            changed.push(OrderField::Notes);
        }
        if draft.delivery_date != s.delivery_date {
            changed.push(OrderField::DeliveryDate);
        }
        if clean.lines != s.lines {
            changed.push(OrderField::Lines);
        }
        if draft.driver_id != s.driver_id {
            changed.push(OrderField::Driver);
        }
        if draft.car_id != s.car_id {
            changed.push(OrderField::Car);
        }
        changed
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
///
/// `shift_id` is the shift the gate bound the order to (required when the
/// delivery date is on or before `today`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub draft: OrderDraft,
    pub today: NaiveDate,
    pub shift_id: Option<ShiftId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseOrder {
    pub order_id: OrderId,
    pub draft: OrderDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LoadOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectLoad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectLoad {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ShipOrder. Missing ids fall back to the ones already on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipOrder {
    pub order_id: OrderId,
    pub driver_id: Option<DriverId>,
    pub car_id: Option<CarId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PurgeOrder (permanent delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    ReviseOrder(ReviseOrder),
    LoadOrder(LoadOrder),
    RejectLoad(RejectLoad),
    ShipOrder(ShipOrder),
    CancelOrder(CancelOrder),
    ArchiveOrder(ArchiveOrder),
    PurgeOrder(PurgeOrder),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub customer: String,
    pub notes: Option<String>,
    pub delivery_date: NaiveDate,
    pub shift_id: Option<ShiftId>,
    pub driver_id: Option<DriverId>,
    pub car_id: Option<CarId>,
    pub lines: LineSet,
    pub immediate: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderRevised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRevised {
    pub order_id: OrderId,
    pub customer: String,
    pub notes: Option<String>,
    pub delivery_date: NaiveDate,
    pub driver_id: Option<DriverId>,
    pub car_id: Option<CarId>,
    pub lines: LineSet,
    /// Desired minus previously reserved quantity, per product.
    pub deltas: Vec<LineDelta>,
    pub changed: Vec<OrderField>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderLoaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLoaded {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoadRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRejected {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderShipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: OrderId,
    pub driver_id: DriverId,
    pub car_id: Option<CarId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub customer: String,
    pub returned: LineSet,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderArchived. `returned` is empty unless the order was pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderArchived {
    pub order_id: OrderId,
    pub customer: String,
    pub returned: LineSet,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderPurged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPurged {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderRevised(OrderRevised),
    OrderLoaded(OrderLoaded),
    LoadRejected(LoadRejected),
    OrderShipped(OrderShipped),
    OrderCancelled(OrderCancelled),
    OrderArchived(OrderArchived),
    OrderPurged(OrderPurged),
}

impl OrderEvent {
    /// Balance changes this event implies, in product order.
    pub fn stock_movements(&self) -> Vec<Movement> {
        match self {
            OrderEvent::OrderPlaced(e) => e
                .lines
                .to_lines()
                .into_iter()
                .map(|l| Movement::reserve(l.product_id, l.quantity))
                .collect(),
            OrderEvent::OrderRevised(e) => {
                e.deltas.iter().copied().map(Movement::from_delta).collect()
            }
            OrderEvent::OrderCancelled(OrderCancelled { returned, .. })
            | OrderEvent::OrderArchived(OrderArchived { returned, .. }) => returned
                .to_lines()
                .into_iter()
                .map(|l| Movement::release(l.product_id, l.quantity))
                .collect(),
            OrderEvent::OrderLoaded(_)
            | OrderEvent::LoadRejected(_)
            | OrderEvent::OrderShipped(_)
            | OrderEvent::OrderPurged(_) => Vec::new(),
        }
    }

    /// Journal note for the entries this event produces.
    pub fn ledger_note(&self) -> String {
        match self {
            OrderEvent::OrderPlaced(e) if e.immediate => format!(
                "order for {}: immediate fulfillment on {}",
                e.customer, e.delivery_date
            ),
            OrderEvent::OrderPlaced(e) => format!(
                "order for {}: reservation for delivery on {}",
                e.customer, e.delivery_date
            ),
            OrderEvent::OrderRevised(e) => format!("order edit for {}", e.customer),
            OrderEvent::OrderCancelled(e) => format!("order cancelled for {}", e.customer),
            OrderEvent::OrderArchived(e) => format!("order archived for {}", e.customer),
            other => other.event_type().to_string(),
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::OrderRevised(_) => "orders.order.revised",
            OrderEvent::OrderLoaded(_) => "orders.order.loaded",
            OrderEvent::LoadRejected(_) => "orders.order.load_rejected",
            OrderEvent::OrderShipped(_) => "orders.order.shipped",
            OrderEvent::OrderCancelled(_) => "orders.order.cancelled",
            OrderEvent::OrderArchived(_) => "orders.order.archived",
            OrderEvent::OrderPurged(_) => "orders.order.purged",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderRevised(e) => e.occurred_at,
            OrderEvent::OrderLoaded(e) => e.occurred_at,
            OrderEvent::LoadRejected(e) => e.occurred_at,
            OrderEvent::OrderShipped(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::OrderArchived(e) => e.occurred_at,
            OrderEvent::OrderPurged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.state = OrderState {
                    customer: e.customer.clone(),
                    notes: e.notes.clone(),
                    delivery_date: e.delivery_date,
                    shift_id: e.shift_id,
                    driver_id: e.driver_id,
                    car_id: e.car_id,
                    status: OrderStatus::Pending,
                    archived: false,
                    lines: e.lines.clone(),
                    created_at: e.occurred_at,
                };
                self.created = true;
            }
            OrderEvent::OrderRevised(e) => {
                self.state.customer = e.customer.clone();
                self.state.notes = e.notes.clone();
                self.state.delivery_date = e.delivery_date;
                self.state.driver_id = e.driver_id;
                self.state.car_id = e.car_id;
                self.state.lines = e.lines.clone();
            }
            OrderEvent::OrderLoaded(_) => {
                self.state.status = OrderStatus::Loaded;
            }
            OrderEvent::LoadRejected(_) => {
                self.state.status = OrderStatus::Pending;
            }
            OrderEvent::OrderShipped(e) => {
                self.state.status = OrderStatus::Shipped;
                self.state.driver_id = Some(e.driver_id);
                self.state.car_id = e.car_id;
            }
            OrderEvent::OrderCancelled(_) => {
                self.state.status = OrderStatus::Cancelled;
            }
            OrderEvent::OrderArchived(_) => {
                self.state.archived = true;
            }
            OrderEvent::OrderPurged(_) => {
                self.created = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::ReviseOrder(cmd) => self.handle_revise(cmd),
            OrderCommand::LoadOrder(cmd) => {
                self.ensure_live(cmd.order_id)?;
                self.ensure_status(OrderStatus::Pending, "only pending orders can be loaded")?;
                Ok(vec![OrderEvent::OrderLoaded(OrderLoaded {
                    order_id: cmd.order_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            OrderCommand::RejectLoad(cmd) => {
                self.ensure_live(cmd.order_id)?;
                self.ensure_status(OrderStatus::Loaded, "only loaded orders can be rejected")?;
                Ok(vec![OrderEvent::LoadRejected(LoadRejected {
                    order_id: cmd.order_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            OrderCommand::ShipOrder(cmd) => self.handle_ship(cmd),
            OrderCommand::CancelOrder(cmd) => {
                self.ensure_live(cmd.order_id)?;
                self.ensure_status(OrderStatus::Pending, "only pending orders can be cancelled")?;
                Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
                    order_id: cmd.order_id,
                    customer: self.state.customer.clone(),
                    returned: self.state.lines.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            OrderCommand::ArchiveOrder(cmd) => {
                self.ensure_live(cmd.order_id)?;
                let returned = if self.state.status == OrderStatus::Pending {
                    self.state.lines.clone()
                } else {
                    LineSet::empty()
                };
                Ok(vec![OrderEvent::OrderArchived(OrderArchived {
                    order_id: cmd.order_id,
                    customer: self.state.customer.clone(),
                    returned,
                    occurred_at: cmd.occurred_at,
                })])
            }
            OrderCommand::PurgeOrder(cmd) => {
                self.ensure_created(cmd.order_id)?;
                self.ensure_status(
                    OrderStatus::Cancelled,
                    "only cancelled orders can be deleted permanently",
                )?;
                Ok(vec![OrderEvent::OrderPurged(OrderPurged {
                    order_id: cmd.order_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Order {
    fn ensure_created(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("order"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    /// Created and not archived.
    fn ensure_live(&self, order_id: OrderId) -> Result<(), DomainError> {
        self.ensure_created(order_id)?;
        if self.state.archived {
            return Err(DomainError::invalid_state("order is archived"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: OrderStatus, msg: &str) -> Result<(), DomainError> {
        if self.state.status != expected {
            return Err(DomainError::invalid_state(format!(
                "{msg} (order is {})",
                self.state.status
            )));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        let clean = cmd.draft.clean()?;

        let immediate = cmd.draft.delivery_date <= cmd.today;
        if immediate && cmd.shift_id.is_none() {
            return Err(DomainError::NoActiveShift);
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            customer: clean.customer,
            notes: clean.notes,
            delivery_date: cmd.draft.delivery_date,
            shift_id: if immediate { cmd.shift_id } else { None },
            driver_id: cmd.draft.driver_id,
            car_id: cmd.draft.car_id,
            lines: clean.lines,
            immediate,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live(cmd.order_id)?;

        let status = self.state.status;
        let allowed = mutable_fields(status);
        if allowed.is_empty() {
            return Err(DomainError::invalid_state(format!(
                "a {status} order cannot be edited"
            )));
        }

        let clean = cmd.draft.clean()?;
        let changed = self.changed_fields(&cmd.draft, &clean);
        if let Some(field) = changed.iter().find(|f| !allowed.contains(f)) {
            return Err(DomainError::invalid_state(format!(
                "{field} cannot be changed on a {status} order"
            )));
        }
        if changed.is_empty() {
            return Ok(vec![]);
        }

        let deltas = clean.lines.delta_from(&self.state.lines);
        Ok(vec![OrderEvent::OrderRevised(OrderRevised {
            order_id: cmd.order_id,
            customer: clean.customer,
            notes: clean.notes,
            delivery_date: cmd.draft.delivery_date,
            driver_id: cmd.draft.driver_id,
            car_id: cmd.draft.car_id,
            lines: clean.lines,
            deltas,
            changed,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_ship(&self, cmd: &ShipOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live(cmd.order_id)?;
        self.ensure_status(OrderStatus::Loaded, "only loaded orders can be shipped")?;

        let driver_id = cmd
            .driver_id
            .or(self.state.driver_id)
            .ok_or_else(|| DomainError::validation("a driver is required to ship an order"))?;

        Ok(vec![OrderEvent::OrderShipped(OrderShipped {
            order_id: cmd.order_id,
            driver_id,
            car_id: cmd.car_id.or(self.state.car_id),
            occurred_at: cmd.occurred_at,
        })])
    }
}
