use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockroom_core::{CarId, DriverId, OrderId, ProductId, SupplyId};
use stockroom_fleet::{Car, Driver};
use stockroom_inventory::LedgerEntry;
use stockroom_orders::Order;
use stockroom_products::Product;
use stockroom_shifts::Shift;
use stockroom_supplies::Supply;

/// Storage failure.
///
/// These are **infrastructure errors** as opposed to domain errors (validation,
/// stock rules, lifecycle).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique or protected-reference constraint hit at the storage level.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored row could not be turned back into a domain value.
    #[error("corrupt row: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(String),
}

/// Pagination parameters for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).clamp(1, 1000),
            offset: offset.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    /// Case-insensitive substring of name or company.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    /// `None` lists archived and non-archived orders alike.
    pub archived: Option<bool>,
    /// Case-insensitive substring of the customer or of a line's product name.
    pub search: Option<String>,
    pub delivery_date: Option<NaiveDate>,
}

impl OrderFilter {
    pub fn active() -> Self {
        Self {
            archived: Some(false),
            ..Self::default()
        }
    }

    pub fn archived() -> Self {
        Self {
            archived: Some(true),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupplyFilter {
    /// Case-insensitive substring of the supplier or of a line's product name.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerFilter {
    pub product_id: Option<ProductId>,
    pub order_id: Option<OrderId>,
    pub supply_id: Option<SupplyId>,
}

/// Warehouse storage.
///
/// Reads go straight to the store; every write happens inside a
/// [`WarehouseTx`] obtained from [`WarehouseStore::begin`].
///
/// Listing order:
/// - products by name,
/// - orders by delivery date, then creation time,
/// - supplies newest first,
/// - ledger entries newest first.
#[async_trait]
pub trait WarehouseStore: Send + Sync {
    /// Open a transaction. Dropping it without `commit` rolls it back.
    async fn begin(&self) -> Result<Box<dyn WarehouseTx>, StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;

    async fn list_drivers(&self) -> Result<Vec<Driver>, StoreError>;
    async fn list_cars(&self) -> Result<Vec<Car>, StoreError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    async fn get_supply(&self, id: SupplyId) -> Result<Option<Supply>, StoreError>;
    async fn list_supplies(&self, filter: &SupplyFilter) -> Result<Vec<Supply>, StoreError>;

    async fn active_shift(&self) -> Result<Option<Shift>, StoreError>;

    async fn ledger_entries(
        &self,
        filter: &LedgerFilter,
        page: Pagination,
    ) -> Result<Vec<LedgerEntry>, StoreError>;
}

/// One atomic unit of warehouse work.
///
/// `lock_*` reads take the row for the rest of the transaction, so a
/// check made on the returned value still holds at commit.
#[async_trait]
pub trait WarehouseTx: Send {
    /// The open shift, locked.
    async fn active_shift(&mut self) -> Result<Option<Shift>, StoreError>;
    async fn save_shift(&mut self, shift: &Shift) -> Result<(), StoreError>;

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;
    /// Locks the existing products among `ids`, in id order. Missing ids are skipped.
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError>;
    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError>;
    /// Writes details and balance.
    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError>;
    /// Products among `ids` still referenced by an order or supply line.
    async fn referenced_products(&mut self, ids: &[ProductId]) -> Result<Vec<ProductId>, StoreError>;
    async fn delete_products(&mut self, ids: &[ProductId]) -> Result<u64, StoreError>;

    async fn driver_exists(&mut self, id: DriverId) -> Result<bool, StoreError>;
    async fn car_exists(&mut self, id: CarId) -> Result<bool, StoreError>;
    async fn car_number_taken(&mut self, number: &str) -> Result<bool, StoreError>;
    async fn insert_driver(&mut self, driver: &Driver) -> Result<(), StoreError>;
    async fn insert_car(&mut self, car: &Car) -> Result<(), StoreError>;
    /// Removes the driver and clears it from orders. `false` when unknown.
    async fn delete_driver(&mut self, id: DriverId) -> Result<bool, StoreError>;
    /// Removes the car and clears it from orders. `false` when unknown.
    async fn delete_car(&mut self, id: CarId) -> Result<bool, StoreError>;

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;
    /// Insert or replace the order together with its line set.
    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError>;
    /// Removes the order; ledger entries keep their rows with the link cleared.
    async fn delete_order(&mut self, id: OrderId) -> Result<(), StoreError>;

    async fn lock_supply(&mut self, id: SupplyId) -> Result<Option<Supply>, StoreError>;
    async fn save_supply(&mut self, supply: &Supply) -> Result<(), StoreError>;
    async fn delete_supply(&mut self, id: SupplyId) -> Result<(), StoreError>;

    async fn append_ledger(&mut self, entries: &[LedgerEntry]) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Lower-cased search needle, `None` for a blank query.
pub(crate) fn needle(search: &Option<String>) -> Option<String> {
    search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}
