//! Warehouse service: the transactional use cases behind the HTTP surface.
//!
//! Every write follows the same pipeline inside one store transaction:
//!
//! ```text
//! begin
//!   ↓
//! 1. Lock the rows the decision depends on (shift, order / supply, products)
//!   ↓
//! 2. Decide: run the aggregate command (pure, produces events)
//!   ↓
//! 3. Derive stock movements from the events and post them to a StockBook
//!   ↓
//! 4. Persist aggregate state, product balances and ledger entries
//!   ↓
//! commit
//! ```
//!
//! Any error before `commit` drops the transaction, which rolls it back, so
//! a rejected operation leaves balances, documents and the ledger untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, instrument};

use stockroom_core::{ActorId, CarId, DomainError, DriverId, OrderId, ProductId, ShiftId, SupplyId};
use stockroom_events::{execute, Event};
use stockroom_fleet::{Car, Driver};
use stockroom_inventory::{
    replay_balance, LedgerContext, LedgerEntry, Movement, StockAccount, StockBook, StockLine,
};
use stockroom_orders::{
    group_by_delivery_date, group_by_delivery_month, order_summary, ArchiveOrder, CancelOrder,
    LoadOrder, Order, OrderCommand, OrderDraft, OrderEvent, PlaceOrder, PurgeOrder, RejectLoad,
    ReviseOrder, ShipOrder, SummaryPeriod, SummaryRow,
};
use stockroom_products::{CreateProduct, Product, ProductCommand, ProductDetails, UpdateProductDetails};
use stockroom_shifts::{Shift, ShiftGate};
use stockroom_supplies::{DeleteSupply, ProcessSupply, RegisterSupply, Supply, SupplyCommand};

use crate::clock::Clock;
use crate::store::{
    LedgerFilter, OrderFilter, Pagination, ProductFilter, StoreError, SupplyFilter,
    WarehouseStore, WarehouseTx,
};

/// Failure of a warehouse operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Input for product creation.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub details: ProductDetails,
    /// Opening balance, journaled as a manual adjustment when positive.
    pub initial_stock: i64,
}

/// Product search result with the grand total of units in stock.
#[derive(Debug, Clone)]
pub struct ProductListing {
    pub products: Vec<Product>,
    pub total_units: i64,
}

type Tx = Box<dyn WarehouseTx>;

#[derive(Clone)]
pub struct WarehouseService {
    store: Arc<dyn WarehouseStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for WarehouseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseService").finish_non_exhaustive()
    }
}

impl WarehouseService {
    pub fn new(store: Arc<dyn WarehouseStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    // -------------------------
    // Shifts
    // -------------------------

    #[instrument(skip(self), err)]
    pub async fn start_shift(&self) -> ServiceResult<Shift> {
        let mut tx = self.store.begin().await?;
        let gate = ShiftGate::new(tx.active_shift().await?);
        let shift = gate.start(ShiftId::new(), self.clock.now())?;
        tx.save_shift(&shift).await?;
        tx.commit().await?;

        info!(shift_id = %shift.id, "shift started");
        Ok(shift)
    }

    #[instrument(skip(self), err)]
    pub async fn end_shift(&self) -> ServiceResult<Shift> {
        let mut tx = self.store.begin().await?;
        let gate = ShiftGate::new(tx.active_shift().await?);
        let shift = gate.end(self.clock.now())?;
        tx.save_shift(&shift).await?;
        tx.commit().await?;

        info!(shift_id = %shift.id, "shift ended");
        Ok(shift)
    }

    pub async fn active_shift(&self) -> ServiceResult<Option<Shift>> {
        Ok(self.store.active_shift().await?)
    }

    // -------------------------
    // Catalog
    // -------------------------

    #[instrument(skip(self, new), fields(name = %new.details.name), err)]
    pub async fn create_product(
        &self,
        actor: Option<ActorId>,
        new: NewProduct,
    ) -> ServiceResult<Product> {
        if new.initial_stock < 0 {
            return Err(DomainError::validation("initial stock cannot be negative").into());
        }

        let product_id = ProductId::new();
        let mut product = Product::empty(product_id);
        execute(
            &mut product,
            &ProductCommand::CreateProduct(CreateProduct {
                product_id,
                details: new.details,
                occurred_at: self.clock.now(),
            }),
        )?;

        let mut tx = self.store.begin().await?;
        tx.insert_product(&product).await?;
        if new.initial_stock > 0 {
            self.post(
                &mut tx,
                std::slice::from_mut(&mut product),
                &[Movement::adjust(product_id, new.initial_stock)],
                &LedgerContext::manual(actor, "initial stock"),
            )
            .await?;
        }
        tx.commit().await?;

        info!(product_id = %product_id, "product created");
        Ok(product)
    }

    /// Replace the editable attributes. The balance is not touched.
    #[instrument(skip(self, details), err)]
    pub async fn update_product(
        &self,
        product_id: ProductId,
        details: ProductDetails,
    ) -> ServiceResult<Product> {
        let mut tx = self.store.begin().await?;
        let mut product = tx
            .lock_product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("product"))?;

        let events = execute(
            &mut product,
            &ProductCommand::UpdateProductDetails(UpdateProductDetails {
                product_id,
                details,
                occurred_at: self.clock.now(),
            }),
        )?;
        if !events.is_empty() {
            tx.update_product(&product).await?;
        }
        tx.commit().await?;
        Ok(product)
    }

    /// Signed manual correction. The balance must stay non-negative.
    #[instrument(skip(self), err)]
    pub async fn adjust_stock(
        &self,
        actor: Option<ActorId>,
        product_id: ProductId,
        change: i64,
        note: Option<String>,
    ) -> ServiceResult<Product> {
        if change == 0 {
            return Err(DomainError::validation("adjustment must be nonzero").into());
        }
        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "manual adjustment".to_string());

        let mut tx = self.store.begin().await?;
        let mut product = tx
            .lock_product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("product"))?;
        self.post(
            &mut tx,
            std::slice::from_mut(&mut product),
            &[Movement::adjust(product_id, change)],
            &LedgerContext::manual(actor, note),
        )
        .await?;
        tx.commit().await?;
        Ok(product)
    }

    /// Delete a batch of products, all or nothing.
    ///
    /// Products still named on an order or supply line are protected; their
    /// ledger history is kept either way.
    #[instrument(skip(self), err)]
    pub async fn delete_products(&self, ids: &[ProductId]) -> ServiceResult<u64> {
        let ids: Vec<ProductId> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if ids.is_empty() {
            return Err(DomainError::validation("no products to delete").into());
        }

        let mut tx = self.store.begin().await?;
        let products = tx.lock_products(&ids).await?;
        if products.len() != ids.len() {
            let found: BTreeSet<ProductId> = products.iter().map(Product::id_typed).collect();
            let missing = ids.iter().find(|id| !found.contains(id));
            return Err(DomainError::not_found(match missing {
                Some(id) => format!("product {id}"),
                None => "product".to_string(),
            })
            .into());
        }

        let referenced = tx.referenced_products(&ids).await?;
        if !referenced.is_empty() {
            let names: Vec<&str> = products
                .iter()
                .filter(|p| referenced.contains(&p.id_typed()))
                .map(Product::name)
                .collect();
            return Err(DomainError::conflict(format!(
                "products still used by orders or supplies: {}",
                names.join(", ")
            ))
            .into());
        }

        let deleted = tx.delete_products(&ids).await?;
        tx.commit().await?;

        info!(deleted, "products deleted");
        Ok(deleted)
    }

    pub async fn get_product(&self, product_id: ProductId) -> ServiceResult<Product> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("product").into())
    }

    pub async fn list_products(&self, search: Option<String>) -> ServiceResult<ProductListing> {
        let products = self.store.list_products(&ProductFilter { search }).await?;
        let total_units = products.iter().map(Product::balance).sum();
        Ok(ProductListing {
            products,
            total_units,
        })
    }

    /// Ledger entries of one product, newest first.
    pub async fn product_history(
        &self,
        product_id: ProductId,
        page: Pagination,
    ) -> ServiceResult<Vec<LedgerEntry>> {
        let filter = LedgerFilter {
            product_id: Some(product_id),
            ..LedgerFilter::default()
        };
        let entries = self.store.ledger_entries(&filter, page).await?;

        // A page is a contiguous run of postings, newest first; the snapshots must chain.
        if let Some(oldest) = entries.last() {
            let opening = oldest
                .balance_after
                .checked_sub(oldest.change)
                .ok_or_else(|| DomainError::invariant("ledger snapshot out of range"))?;
            replay_balance(opening, entries.iter().rev())?;
        }
        Ok(entries)
    }

    // -------------------------
    // Fleet
    // -------------------------

    #[instrument(skip(self), err)]
    pub async fn register_driver(&self, name: String) -> ServiceResult<Driver> {
        let driver = Driver::register(DriverId::new(), name)?;
        let mut tx = self.store.begin().await?;
        tx.insert_driver(&driver).await?;
        tx.commit().await?;
        Ok(driver)
    }

    #[instrument(skip(self), err)]
    pub async fn register_car(&self, number: String) -> ServiceResult<Car> {
        let car = Car::register(CarId::new(), number)?;
        let mut tx = self.store.begin().await?;
        if tx.car_number_taken(&car.number).await? {
            return Err(DomainError::conflict(format!(
                "car number {} is already registered",
                car.number
            ))
            .into());
        }
        tx.insert_car(&car).await?;
        tx.commit().await?;
        Ok(car)
    }

    pub async fn list_drivers(&self) -> ServiceResult<Vec<Driver>> {
        Ok(self.store.list_drivers().await?)
    }

    pub async fn list_cars(&self) -> ServiceResult<Vec<Car>> {
        Ok(self.store.list_cars().await?)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_driver(&self, driver_id: DriverId) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_driver(driver_id).await? {
            return Err(DomainError::not_found("driver").into());
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn delete_car(&self, car_id: CarId) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_car(car_id).await? {
            return Err(DomainError::not_found("car").into());
        }
        tx.commit().await?;
        Ok(())
    }

    // -------------------------
    // Orders
    // -------------------------

    /// Place an order and reserve its lines.
    ///
    /// An order due today or earlier needs an open shift and is bound to it.
    #[instrument(skip(self, draft), fields(customer = %draft.customer), err)]
    pub async fn create_order(
        &self,
        actor: Option<ActorId>,
        draft: OrderDraft,
    ) -> ServiceResult<Order> {
        let order_id = OrderId::new();
        let today = self.clock.today();

        let mut tx = self.store.begin().await?;
        ensure_fleet(&mut tx, draft.driver_id, draft.car_id).await?;
        let gate = ShiftGate::new(tx.active_shift().await?);
        let shift_id = gate.shift_for(draft.delivery_date, today)?;

        let mut order = Order::empty(order_id);
        let events = execute(
            &mut order,
            &OrderCommand::PlaceOrder(PlaceOrder {
                order_id,
                draft,
                today,
                shift_id,
                occurred_at: self.clock.now(),
            }),
        )?;
        self.persist_order(&mut tx, actor, &order, &events).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Apply an edit within what the order's status allows; line changes
    /// post only the per-product differences.
    #[instrument(skip(self, draft), err)]
    pub async fn edit_order(
        &self,
        actor: Option<ActorId>,
        order_id: OrderId,
        draft: OrderDraft,
    ) -> ServiceResult<Order> {
        let fleet = (draft.driver_id, draft.car_id);
        let cmd = OrderCommand::ReviseOrder(ReviseOrder {
            order_id,
            draft,
            occurred_at: self.clock.now(),
        });
        self.order_command(actor, order_id, fleet, cmd).await
    }

    #[instrument(skip(self), err)]
    pub async fn load_order(&self, actor: Option<ActorId>, order_id: OrderId) -> ServiceResult<Order> {
        let cmd = OrderCommand::LoadOrder(LoadOrder {
            order_id,
            occurred_at: self.clock.now(),
        });
        self.order_command(actor, order_id, (None, None), cmd).await
    }

    #[instrument(skip(self), err)]
    pub async fn reject_load(&self, actor: Option<ActorId>, order_id: OrderId) -> ServiceResult<Order> {
        let cmd = OrderCommand::RejectLoad(RejectLoad {
            order_id,
            occurred_at: self.clock.now(),
        });
        self.order_command(actor, order_id, (None, None), cmd).await
    }

    /// Ship a loaded order. Driver and car default to the ones on the order.
    #[instrument(skip(self), err)]
    pub async fn ship_order(
        &self,
        actor: Option<ActorId>,
        order_id: OrderId,
        driver_id: Option<DriverId>,
        car_id: Option<CarId>,
    ) -> ServiceResult<Order> {
        let cmd = OrderCommand::ShipOrder(ShipOrder {
            order_id,
            driver_id,
            car_id,
            occurred_at: self.clock.now(),
        });
        self.order_command(actor, order_id, (driver_id, car_id), cmd).await
    }

    #[instrument(skip(self), err)]
    pub async fn cancel_order(&self, actor: Option<ActorId>, order_id: OrderId) -> ServiceResult<Order> {
        let cmd = OrderCommand::CancelOrder(CancelOrder {
            order_id,
            occurred_at: self.clock.now(),
        });
        self.order_command(actor, order_id, (None, None), cmd).await
    }

    /// Archive an order. A pending order hands its stock back first.
    #[instrument(skip(self), err)]
    pub async fn archive_order(&self, actor: Option<ActorId>, order_id: OrderId) -> ServiceResult<Order> {
        let cmd = OrderCommand::ArchiveOrder(ArchiveOrder {
            order_id,
            occurred_at: self.clock.now(),
        });
        self.order_command(actor, order_id, (None, None), cmd).await
    }

    /// Permanently delete a cancelled order. Its ledger rows stay, unlinked.
    #[instrument(skip(self), err)]
    pub async fn purge_order(&self, actor: Option<ActorId>, order_id: OrderId) -> ServiceResult<()> {
        let cmd = OrderCommand::PurgeOrder(PurgeOrder {
            order_id,
            occurred_at: self.clock.now(),
        });
        self.order_command(actor, order_id, (None, None), cmd).await?;
        Ok(())
    }

    pub async fn get_order(&self, order_id: OrderId) -> ServiceResult<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order").into())
    }

    /// Non-archived orders grouped by delivery date, earliest first.
    pub async fn list_orders(
        &self,
        search: Option<String>,
        delivery_date: Option<NaiveDate>,
    ) -> ServiceResult<Vec<(NaiveDate, Vec<Order>)>> {
        let filter = OrderFilter {
            search,
            delivery_date,
            ..OrderFilter::active()
        };
        let orders = self.store.list_orders(&filter).await?;
        Ok(group_by_delivery_date(orders))
    }

    /// Archived orders grouped by delivery month, newest month first.
    pub async fn list_archived_orders(
        &self,
        search: Option<String>,
        delivery_date: Option<NaiveDate>,
    ) -> ServiceResult<Vec<(NaiveDate, Vec<Order>)>> {
        let filter = OrderFilter {
            search,
            delivery_date,
            ..OrderFilter::archived()
        };
        let orders = self.store.list_orders(&filter).await?;
        Ok(group_by_delivery_month(orders))
    }

    // -------------------------
    // Supplies
    // -------------------------

    #[instrument(skip(self, lines), err)]
    pub async fn register_supply(
        &self,
        supplier: String,
        lines: Vec<StockLine>,
    ) -> ServiceResult<Supply> {
        let supply_id = SupplyId::new();
        let mut supply = Supply::empty(supply_id);
        execute(
            &mut supply,
            &SupplyCommand::RegisterSupply(RegisterSupply {
                supply_id,
                supplier,
                lines,
                occurred_at: self.clock.now(),
            }),
        )?;

        let mut tx = self.store.begin().await?;
        lock_line_products(&mut tx, supply.lines().products()).await?;
        tx.save_supply(&supply).await?;
        tx.commit().await?;
        Ok(supply)
    }

    /// Receive a pending supply into stock. Runs at most once per supply.
    #[instrument(skip(self), err)]
    pub async fn process_supply(
        &self,
        actor: Option<ActorId>,
        supply_id: SupplyId,
    ) -> ServiceResult<Supply> {
        let mut tx = self.store.begin().await?;
        let mut supply = tx
            .lock_supply(supply_id)
            .await?
            .ok_or_else(|| DomainError::not_found("supply"))?;

        let events = execute(
            &mut supply,
            &SupplyCommand::ProcessSupply(ProcessSupply {
                supply_id,
                occurred_at: self.clock.now(),
            }),
        )?;

        let mut products = lock_line_products(&mut tx, supply.lines().products()).await?;
        tx.save_supply(&supply).await?;
        for event in &events {
            let ctx = LedgerContext::for_supply(actor, supply_id, event.ledger_note());
            self.post(&mut tx, &mut products, &event.stock_movements(), &ctx)
                .await?;
        }
        tx.commit().await?;

        info!(supply_id = %supply_id, units = supply.total_units(), "supply processed");
        Ok(supply)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_supply(&self, supply_id: SupplyId) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        let mut supply = tx
            .lock_supply(supply_id)
            .await?
            .ok_or_else(|| DomainError::not_found("supply"))?;
        execute(
            &mut supply,
            &SupplyCommand::DeleteSupply(DeleteSupply {
                supply_id,
                occurred_at: self.clock.now(),
            }),
        )?;
        tx.delete_supply(supply_id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_supply(&self, supply_id: SupplyId) -> ServiceResult<Supply> {
        self.store
            .get_supply(supply_id)
            .await?
            .ok_or_else(|| DomainError::not_found("supply").into())
    }

    pub async fn list_supplies(&self, search: Option<String>) -> ServiceResult<Vec<Supply>> {
        Ok(self.store.list_supplies(&SupplyFilter { search }).await?)
    }

    // -------------------------
    // Reports
    // -------------------------

    /// Units per product and period over shipped orders and loaded, live ones.
    #[instrument(skip(self), err)]
    pub async fn order_summary(
        &self,
        period: SummaryPeriod,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> ServiceResult<Vec<SummaryRow>> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(DomainError::validation("'from' must not be after 'to'").into());
            }
        }
        let orders = self.store.list_orders(&OrderFilter::default()).await?;
        let names: BTreeMap<ProductId, String> = self
            .store
            .list_products(&ProductFilter::default())
            .await?
            .into_iter()
            .map(|p| (p.id_typed(), p.name().to_string()))
            .collect();
        Ok(order_summary(&orders, &names, period, from, to))
    }

    // -------------------------
    // Pipeline helpers
    // -------------------------

    async fn order_command(
        &self,
        actor: Option<ActorId>,
        order_id: OrderId,
        fleet: (Option<DriverId>, Option<CarId>),
        cmd: OrderCommand,
    ) -> ServiceResult<Order> {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order"))?;
        ensure_fleet(&mut tx, fleet.0, fleet.1).await?;

        let events = execute(&mut order, &cmd)?;
        self.persist_order(&mut tx, actor, &order, &events).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Write the order's new state and post the stock its events move.
    async fn persist_order(
        &self,
        tx: &mut Tx,
        actor: Option<ActorId>,
        order: &Order,
        events: &[OrderEvent],
    ) -> ServiceResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let order_id = order.id_typed();

        if events.iter().any(|e| matches!(e, OrderEvent::OrderPurged(_))) {
            tx.delete_order(order_id).await?;
            info!(order_id = %order_id, "order purged");
            return Ok(());
        }

        let touched = events
            .iter()
            .flat_map(OrderEvent::stock_movements)
            .map(|m| m.product_id)
            .chain(order.lines().products());
        let mut products = lock_line_products(tx, touched).await?;

        tx.save_order(order).await?;
        for event in events {
            let ctx = LedgerContext::for_order(actor, order_id, event.ledger_note());
            self.post(tx, &mut products, &event.stock_movements(), &ctx)
                .await?;
            info!(order_id = %order_id, event = event.event_type(), "order updated");
        }
        Ok(())
    }

    /// Post movements against locked products and journal the result.
    ///
    /// Balances are checked for the whole batch before anything is written.
    async fn post(
        &self,
        tx: &mut Tx,
        products: &mut [Product],
        movements: &[Movement],
        ctx: &LedgerContext,
    ) -> ServiceResult<Vec<LedgerEntry>> {
        if movements.is_empty() {
            return Ok(Vec::new());
        }

        let mut book = StockBook::new(products.iter().map(|p| StockAccount {
            product_id: p.id_typed(),
            name: p.name().to_string(),
            balance: p.balance(),
        }));
        let postings = book.post(movements)?;

        for product in products.iter_mut() {
            if let Some(balance) = book.balance(product.id_typed()) {
                if balance != product.balance() {
                    product.record_balance(balance);
                    tx.update_product(product).await?;
                }
            }
        }

        let entries = LedgerEntry::record_all(&postings, ctx, self.clock.now());
        tx.append_ledger(&entries).await?;

        for posting in &postings {
            info!(
                product_id = %posting.product_id,
                change = posting.change,
                balance_after = posting.balance_after,
                cause = %posting.cause,
                "stock posted"
            );
        }
        Ok(entries)
    }
}

/// Lock the products named by a set of lines; every one must exist.
async fn lock_line_products(
    tx: &mut Tx,
    ids: impl IntoIterator<Item = ProductId>,
) -> ServiceResult<Vec<Product>> {
    let ids: Vec<ProductId> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
    let products = tx.lock_products(&ids).await?;
    if products.len() != ids.len() {
        let found: BTreeSet<ProductId> = products.iter().map(Product::id_typed).collect();
        if let Some(missing) = ids.iter().find(|id| !found.contains(id)) {
            return Err(DomainError::validation(format!("product {missing} does not exist")).into());
        }
    }
    Ok(products)
}

async fn ensure_fleet(
    tx: &mut Tx,
    driver_id: Option<DriverId>,
    car_id: Option<CarId>,
) -> ServiceResult<()> {
    if let Some(id) = driver_id {
        if !tx.driver_exists(id).await? {
            return Err(DomainError::validation(format!("driver {id} does not exist")).into());
        }
    }
    if let Some(id) = car_id {
        if !tx.car_exists(id).await? {
            return Err(DomainError::validation(format!("car {id} does not exist")).into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::InMemoryWarehouseStore;
    use stockroom_inventory::{net_change_by_product, MovementCause};
    use stockroom_orders::OrderStatus;
    use stockroom_supplies::SupplyStatus;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn later() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 20).unwrap()
    }

    fn service() -> WarehouseService {
        WarehouseService::new(
            Arc::new(InMemoryWarehouseStore::new()),
            Arc::new(FixedClock::on(today())),
        )
    }

    async fn product(svc: &WarehouseService, name: &str, stock: i64) -> ProductId {
        svc.create_product(
            None,
            NewProduct {
                details: ProductDetails::new(name, "Acme", 40),
                initial_stock: stock,
            },
        )
        .await
        .unwrap()
        .id_typed()
    }

    fn draft(delivery_date: NaiveDate, lines: Vec<StockLine>) -> OrderDraft {
        OrderDraft {
            customer: "Northwind".to_string(),
            notes: None,
            delivery_date,
            lines,
            driver_id: None,
            car_id: None,
        }
    }

    async fn balance(svc: &WarehouseService, id: ProductId) -> i64 {
        svc.get_product(id).await.unwrap().balance()
    }

    async fn history(svc: &WarehouseService, id: ProductId) -> Vec<LedgerEntry> {
        svc.product_history(id, Pagination::new(Some(1000), None))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn ledger_sums_to_balance_across_operations() {
        let svc = service();
        let p = product(&svc, "Stretch film", 100).await;

        let order = svc
            .create_order(None, draft(later(), vec![StockLine::new(p, 30)]))
            .await
            .unwrap();
        let supply = svc
            .register_supply("Acme Supply".to_string(), vec![StockLine::new(p, 20)])
            .await
            .unwrap();
        svc.process_supply(None, supply.id_typed()).await.unwrap();
        svc.adjust_stock(None, p, -5, Some("damaged".to_string()))
            .await
            .unwrap();
        svc.edit_order(None, order.id_typed(), draft(later(), vec![StockLine::new(p, 10)]))
            .await
            .unwrap();

        assert_eq!(balance(&svc, p).await, 105);
        let entries = history(&svc, p).await;
        assert_eq!(net_change_by_product(&entries).get(&p), Some(&105));
        // Newest first.
        assert_eq!(entries[0].balance_after, 105);
        assert_eq!(entries[0].cause, MovementCause::OrderReturn);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_everything_untouched() {
        let svc = service();
        let a = product(&svc, "A", 100).await;
        let b = product(&svc, "B", 10).await;

        let err = svc
            .create_order(
                None,
                draft(later(), vec![StockLine::new(a, 50), StockLine::new(b, 11)]),
            )
            .await
            .unwrap_err();
        match err {
            ServiceError::Domain(DomainError::InsufficientStock {
                product,
                requested,
                available,
            }) => {
                assert_eq!(product, "B");
                assert_eq!(requested, 11);
                assert_eq!(available, 10);
            }
            other => panic!("Expected InsufficientStock, got {other:?}"),
        }

        assert_eq!(balance(&svc, a).await, 100);
        assert_eq!(balance(&svc, b).await, 10);
        assert!(svc.list_orders(None, None).await.unwrap().is_empty());
        assert_eq!(history(&svc, a).await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_lines_are_rejected() {
        let svc = service();
        let p = product(&svc, "A", 100).await;

        let err = svc
            .create_order(
                None,
                draft(later(), vec![StockLine::new(p, 5), StockLine::new(p, 6)]),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::DuplicateLineItem(id)) if id == p
        ));
        assert_eq!(balance(&svc, p).await, 100);
    }

    #[tokio::test]
    async fn unknown_product_on_a_line_is_a_validation_error() {
        let svc = service();
        let err = svc
            .create_order(None, draft(later(), vec![StockLine::new(ProductId::new(), 5)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn supply_is_received_once() {
        let svc = service();
        let p = product(&svc, "A", 0).await;
        let supply = svc
            .register_supply("Acme Supply".to_string(), vec![StockLine::new(p, 20)])
            .await
            .unwrap();
        assert_eq!(balance(&svc, p).await, 0);

        let processed = svc.process_supply(None, supply.id_typed()).await.unwrap();
        assert_eq!(processed.status(), SupplyStatus::Completed);
        let again = svc.process_supply(None, supply.id_typed()).await.unwrap_err();
        assert!(matches!(again, ServiceError::Domain(DomainError::AlreadyProcessed)));

        assert_eq!(balance(&svc, p).await, 20);
        let entries = history(&svc, p).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].supply_id, Some(supply.id_typed()));
        assert_eq!(entries[0].note, "supply from Acme Supply");

        // Completed supplies are kept.
        let err = svc.delete_supply(supply.id_typed()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvalidState(_))));
    }

    async fn newest(svc: &WarehouseService, id: ProductId) -> (i64, i64, MovementCause) {
        let entries = history(svc, id).await;
        let e = &entries[0];
        (e.change, e.balance_after, e.cause)
    }

    #[tokio::test]
    async fn immediate_order_then_cancel_journals_out_and_return() {
        let svc = service();
        let p = product(&svc, "P", 100).await;
        svc.start_shift().await.unwrap();

        let order = svc
            .create_order(None, draft(today(), vec![StockLine::new(p, 30)]))
            .await
            .unwrap();
        assert_eq!(balance(&svc, p).await, 70);
        assert_eq!(newest(&svc, p).await, (-30, 70, MovementCause::OrderOut));

        svc.cancel_order(None, order.id_typed()).await.unwrap();
        assert_eq!(balance(&svc, p).await, 100);
        assert_eq!(newest(&svc, p).await, (30, 100, MovementCause::OrderReturn));
        assert_eq!(history(&svc, p).await[0].order_id, Some(order.id_typed()));
    }

    #[tokio::test]
    async fn supply_receipt_journals_once_onto_current_balance() {
        let svc = service();
        let p = product(&svc, "P", 70).await;
        let supply = svc
            .register_supply("Acme Supply".to_string(), vec![StockLine::new(p, 50)])
            .await
            .unwrap();

        svc.process_supply(None, supply.id_typed()).await.unwrap();
        assert_eq!(balance(&svc, p).await, 120);
        assert_eq!(newest(&svc, p).await, (50, 120, MovementCause::SupplyIn));

        let again = svc.process_supply(None, supply.id_typed()).await.unwrap_err();
        assert!(matches!(again, ServiceError::Domain(DomainError::AlreadyProcessed)));
        assert_eq!(balance(&svc, p).await, 120);
        assert_eq!(history(&svc, p).await.len(), 2);
    }

    #[tokio::test]
    async fn out_of_range_quantities_are_rejected_without_changes() {
        let svc = service();
        let p = product(&svc, "P", 10).await;

        let err = svc.adjust_stock(None, p, i64::MIN, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));

        let supply = svc
            .register_supply("Acme Supply".to_string(), vec![StockLine::new(p, i64::MAX)])
            .await
            .unwrap();
        let err = svc.process_supply(None, supply.id_typed()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));

        assert_eq!(balance(&svc, p).await, 10);
        assert_eq!(history(&svc, p).await.len(), 1);
        let pending = svc.get_supply(supply.id_typed()).await.unwrap();
        assert_eq!(pending.status(), SupplyStatus::Pending);
    }

    #[tokio::test]
    async fn history_pages_chain_their_snapshots() {
        let svc = service();
        let p = product(&svc, "P", 10).await;
        for change in [5, -3, 7] {
            svc.adjust_stock(None, p, change, None).await.unwrap();
        }
        let page = svc
            .product_history(p, Pagination::new(Some(2), Some(1)))
            .await
            .unwrap();
        let snapshots: Vec<i64> = page.iter().map(|e| e.balance_after).collect();
        assert_eq!(snapshots, vec![12, 15]);
    }

    #[tokio::test]
    async fn create_then_cancel_restores_balance() {
        let svc = service();
        let p = product(&svc, "A", 100).await;

        let order = svc
            .create_order(None, draft(later(), vec![StockLine::new(p, 40)]))
            .await
            .unwrap();
        assert_eq!(balance(&svc, p).await, 60);

        let cancelled = svc.cancel_order(None, order.id_typed()).await.unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(balance(&svc, p).await, 100);

        let causes: Vec<MovementCause> = history(&svc, p).await.iter().map(|e| e.cause).collect();
        assert_eq!(
            causes,
            vec![
                MovementCause::OrderReturn,
                MovementCause::OrderOut,
                MovementCause::ManualAdjust
            ]
        );

        // A second cancel is refused and returns nothing.
        let err = svc.cancel_order(None, order.id_typed()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvalidState(_))));
        assert_eq!(balance(&svc, p).await, 100);
    }

    #[tokio::test]
    async fn immediate_orders_need_an_open_shift() {
        let svc = service();
        let p = product(&svc, "A", 100).await;

        let err = svc
            .create_order(None, draft(today(), vec![StockLine::new(p, 5)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::NoActiveShift)));
        assert_eq!(balance(&svc, p).await, 100);

        let shift = svc.start_shift().await.unwrap();
        let order = svc
            .create_order(None, draft(today(), vec![StockLine::new(p, 5)]))
            .await
            .unwrap();
        assert_eq!(order.state().shift_id, Some(shift.id));
        assert!(history(&svc, p).await[0].note.contains("immediate fulfillment"));

        let future = svc
            .create_order(None, draft(later(), vec![StockLine::new(p, 5)]))
            .await
            .unwrap();
        assert_eq!(future.state().shift_id, None);
    }

    #[tokio::test]
    async fn shift_gate_rules() {
        let svc = service();
        assert!(matches!(
            svc.end_shift().await.unwrap_err(),
            ServiceError::Domain(DomainError::NoActiveShift)
        ));

        let shift = svc.start_shift().await.unwrap();
        assert!(matches!(
            svc.start_shift().await.unwrap_err(),
            ServiceError::Domain(DomainError::AlreadyActive)
        ));
        assert_eq!(svc.active_shift().await.unwrap().map(|s| s.id), Some(shift.id));

        let ended = svc.end_shift().await.unwrap();
        assert!(!ended.active);
        assert!(svc.active_shift().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn archive_returns_stock_only_for_pending_orders() {
        let svc = service();
        let p = product(&svc, "A", 100).await;

        let pending = svc
            .create_order(None, draft(later(), vec![StockLine::new(p, 10)]))
            .await
            .unwrap();
        let loaded = svc
            .create_order(None, draft(later(), vec![StockLine::new(p, 20)]))
            .await
            .unwrap();
        svc.load_order(None, loaded.id_typed()).await.unwrap();
        assert_eq!(balance(&svc, p).await, 70);

        let archived = svc.archive_order(None, pending.id_typed()).await.unwrap();
        assert!(archived.is_archived());
        assert_eq!(balance(&svc, p).await, 80);

        svc.archive_order(None, loaded.id_typed()).await.unwrap();
        assert_eq!(balance(&svc, p).await, 80);

        let err = svc.archive_order(None, pending.id_typed()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvalidState(_))));
        assert_eq!(balance(&svc, p).await, 80);

        assert!(svc.list_orders(None, None).await.unwrap().is_empty());
        let groups = svc.list_archived_orders(None, None).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[tokio::test]
    async fn loaded_order_lines_are_frozen() {
        let svc = service();
        let p = product(&svc, "A", 100).await;
        let order = svc
            .create_order(None, draft(later(), vec![StockLine::new(p, 10)]))
            .await
            .unwrap();
        svc.load_order(None, order.id_typed()).await.unwrap();

        let err = svc
            .edit_order(None, order.id_typed(), draft(later(), vec![StockLine::new(p, 15)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvalidState(_))));
        assert_eq!(balance(&svc, p).await, 90);

        // Reassigning the driver stays allowed.
        let driver = svc.register_driver("Ivan".to_string()).await.unwrap();
        let mut reassign = draft(later(), vec![StockLine::new(p, 10)]);
        reassign.driver_id = Some(driver.id);
        let edited = svc.edit_order(None, order.id_typed(), reassign).await.unwrap();
        assert_eq!(edited.state().driver_id, Some(driver.id));
    }

    #[tokio::test]
    async fn failed_edit_rolls_back_entirely() {
        let svc = service();
        let a = product(&svc, "A", 100).await;
        let b = product(&svc, "B", 5).await;
        let order = svc
            .create_order(None, draft(later(), vec![StockLine::new(a, 10)]))
            .await
            .unwrap();

        let err = svc
            .edit_order(
                None,
                order.id_typed(),
                draft(later(), vec![StockLine::new(a, 1), StockLine::new(b, 6)]),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::InsufficientStock { .. })
        ));

        assert_eq!(balance(&svc, a).await, 90);
        assert_eq!(balance(&svc, b).await, 5);
        let stored = svc.get_order(order.id_typed()).await.unwrap();
        assert_eq!(stored.lines().quantity(a), 10);
        assert!(!stored.lines().contains(b));
    }

    #[tokio::test]
    async fn shipping_uses_driver_from_command_or_order() {
        let svc = service();
        let p = product(&svc, "A", 100).await;
        let order = svc
            .create_order(None, draft(later(), vec![StockLine::new(p, 10)]))
            .await
            .unwrap();
        svc.load_order(None, order.id_typed()).await.unwrap();

        let err = svc
            .ship_order(None, order.id_typed(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));

        let err = svc
            .ship_order(None, order.id_typed(), Some(DriverId::new()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));

        let driver = svc.register_driver("Ivan".to_string()).await.unwrap();
        let car = svc.register_car("ab 123".to_string()).await.unwrap();
        let shipped = svc
            .ship_order(None, order.id_typed(), Some(driver.id), Some(car.id))
            .await
            .unwrap();
        assert_eq!(shipped.status(), OrderStatus::Shipped);
        assert_eq!(shipped.state().car_id, Some(car.id));
        assert_eq!(balance(&svc, p).await, 90);
    }

    #[tokio::test]
    async fn purge_removes_cancelled_order_but_keeps_ledger() {
        let svc = service();
        let p = product(&svc, "A", 100).await;
        let order = svc
            .create_order(None, draft(later(), vec![StockLine::new(p, 10)]))
            .await
            .unwrap();

        let err = svc.purge_order(None, order.id_typed()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvalidState(_))));

        svc.cancel_order(None, order.id_typed()).await.unwrap();
        svc.purge_order(None, order.id_typed()).await.unwrap();

        assert!(matches!(
            svc.get_order(order.id_typed()).await.unwrap_err(),
            ServiceError::Domain(DomainError::NotFound(_))
        ));
        let entries = history(&svc, p).await;
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.order_id.is_none()));
        assert_eq!(balance(&svc, p).await, 100);
    }

    #[tokio::test]
    async fn referenced_products_cannot_be_deleted() {
        let svc = service();
        let used = product(&svc, "Used", 100).await;
        let free = product(&svc, "Free", 3).await;
        svc.create_order(None, draft(later(), vec![StockLine::new(used, 10)]))
            .await
            .unwrap();

        let err = svc.delete_products(&[used, free]).await.unwrap_err();
        match err {
            ServiceError::Domain(DomainError::Conflict(msg)) => assert!(msg.contains("Used")),
            other => panic!("Expected Conflict, got {other:?}"),
        }
        assert_eq!(balance(&svc, free).await, 3);

        assert_eq!(svc.delete_products(&[free]).await.unwrap(), 1);
        assert!(matches!(
            svc.get_product(free).await.unwrap_err(),
            ServiceError::Domain(DomainError::NotFound(_))
        ));
        assert_eq!(history(&svc, free).await.len(), 1);

        assert!(matches!(
            svc.delete_products(&[ProductId::new()]).await.unwrap_err(),
            ServiceError::Domain(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn manual_adjust_cannot_go_negative() {
        let svc = service();
        let p = product(&svc, "A", 10).await;

        let err = svc.adjust_stock(None, p, -11, None).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::InsufficientStock { available: 10, .. })
        ));
        assert!(matches!(
            svc.adjust_stock(None, p, 0, None).await.unwrap_err(),
            ServiceError::Domain(DomainError::Validation(_))
        ));

        let actor = ActorId::new();
        let adjusted = svc.adjust_stock(Some(actor), p, -10, None).await.unwrap();
        assert_eq!(adjusted.balance(), 0);
        let last = &history(&svc, p).await[0];
        assert_eq!(last.actor, Some(actor));
        assert_eq!(last.note, "manual adjustment");
    }

    #[tokio::test]
    async fn product_updates_keep_the_balance() {
        let svc = service();
        let p = product(&svc, "A", 42).await;
        let mut details = ProductDetails::new("A prime", "Acme", 50);
        details.notes = Some("top shelf".to_string());

        let updated = svc.update_product(p, details).await.unwrap();
        assert_eq!(updated.name(), "A prime");
        assert_eq!(updated.balance(), 42);

        let listing = svc.list_products(Some("prime".to_string())).await.unwrap();
        assert_eq!(listing.products.len(), 1);
        assert_eq!(listing.total_units, 42);
    }

    #[tokio::test]
    async fn duplicate_car_numbers_conflict() {
        let svc = service();
        svc.register_car("ab 123".to_string()).await.unwrap();
        let err = svc.register_car("AB 123".to_string()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn deleting_a_driver_clears_it_from_orders() {
        let svc = service();
        let p = product(&svc, "A", 100).await;
        let driver = svc.register_driver("Ivan".to_string()).await.unwrap();
        let mut d = draft(later(), vec![StockLine::new(p, 1)]);
        d.driver_id = Some(driver.id);
        let order = svc.create_order(None, d).await.unwrap();

        svc.delete_driver(driver.id).await.unwrap();
        assert_eq!(svc.get_order(order.id_typed()).await.unwrap().state().driver_id, None);
        assert!(matches!(
            svc.delete_driver(driver.id).await.unwrap_err(),
            ServiceError::Domain(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn summary_counts_shipped_and_live_loaded_orders() {
        let svc = service();
        let p = product(&svc, "Film", 1000).await;
        let driver = svc.register_driver("Ivan".to_string()).await.unwrap();

        let shipped = svc
            .create_order(None, draft(later(), vec![StockLine::new(p, 10)]))
            .await
            .unwrap();
        svc.load_order(None, shipped.id_typed()).await.unwrap();
        svc.ship_order(None, shipped.id_typed(), Some(driver.id), None)
            .await
            .unwrap();

        let loaded = svc
            .create_order(None, draft(later(), vec![StockLine::new(p, 5)]))
            .await
            .unwrap();
        svc.load_order(None, loaded.id_typed()).await.unwrap();

        svc.create_order(None, draft(later(), vec![StockLine::new(p, 100)]))
            .await
            .unwrap();

        let rows = svc
            .order_summary(SummaryPeriod::Month, None, None)
            .await
            .unwrap();
        assert_eq!(
            rows,
            vec![SummaryRow {
                period: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                product_name: "Film".to_string(),
                total_quantity: 15,
            }]
        );

        let outside = svc
            .order_summary(SummaryPeriod::Day, Some(later()), None)
            .await
            .unwrap();
        assert!(outside.is_empty());
    }
}
