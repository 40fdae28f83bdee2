use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockroom_core::{AggregateRoot, CarId, DriverId, OrderId, ProductId, ShiftId, SupplyId};
use stockroom_fleet::{Car, Driver};
use stockroom_inventory::{LedgerEntry, LineSet};
use stockroom_orders::Order;
use stockroom_products::Product;
use stockroom_shifts::Shift;
use stockroom_supplies::Supply;

use super::r#trait::{
    needle, LedgerFilter, OrderFilter, Pagination, ProductFilter, StoreError, SupplyFilter,
    WarehouseStore, WarehouseTx,
};

#[derive(Debug, Clone, Default)]
struct State {
    products: BTreeMap<ProductId, Product>,
    drivers: BTreeMap<DriverId, Driver>,
    cars: BTreeMap<CarId, Car>,
    orders: BTreeMap<OrderId, Order>,
    supplies: BTreeMap<SupplyId, Supply>,
    shifts: BTreeMap<ShiftId, Shift>,
    /// Append order is chronological order.
    ledger: Vec<LedgerEntry>,
}

impl State {
    fn lines_mention(&self, lines: &LineSet, needle: &str) -> bool {
        lines.products().any(|id| {
            self.products
                .get(&id)
                .is_some_and(|p| p.name().to_lowercase().contains(needle))
        })
    }
}

/// In-memory warehouse store.
///
/// Intended for tests/dev. Transactions are serialized behind one async mutex
/// and work on a copy of the state that replaces the original on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWarehouseStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryWarehouseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WarehouseStore for InMemoryWarehouseStore {
    async fn begin(&self) -> Result<Box<dyn WarehouseTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(InMemoryTx { guard, work }))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let state = self.state.lock().await;
        let needle = needle(&filter.search);
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| needle.as_deref().is_none_or(|n| p.matches(n)))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name().cmp(b.name()).then(a.id_typed().cmp(&b.id_typed())));
        Ok(products)
    }

    async fn list_drivers(&self) -> Result<Vec<Driver>, StoreError> {
        let state = self.state.lock().await;
        let mut drivers: Vec<Driver> = state.drivers.values().cloned().collect();
        drivers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(drivers)
    }

    async fn list_cars(&self) -> Result<Vec<Car>, StoreError> {
        let state = self.state.lock().await;
        let mut cars: Vec<Car> = state.cars.values().cloned().collect();
        cars.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(cars)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        let needle = needle(&filter.search);
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| filter.archived.is_none_or(|a| o.is_archived() == a))
            .filter(|o| {
                filter
                    .delivery_date
                    .is_none_or(|d| o.state().delivery_date == d)
            })
            .filter(|o| {
                needle.as_deref().is_none_or(|n| {
                    o.state().customer.to_lowercase().contains(n) || state.lines_mention(o.lines(), n)
                })
            })
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.state().delivery_date, o.state().created_at, o.id_typed()));
        Ok(orders)
    }

    async fn get_supply(&self, id: SupplyId) -> Result<Option<Supply>, StoreError> {
        Ok(self.state.lock().await.supplies.get(&id).cloned())
    }

    async fn list_supplies(&self, filter: &SupplyFilter) -> Result<Vec<Supply>, StoreError> {
        let state = self.state.lock().await;
        let needle = needle(&filter.search);
        let mut supplies: Vec<Supply> = state
            .supplies
            .values()
            .filter(|s| {
                needle.as_deref().is_none_or(|n| {
                    s.state().supplier.to_lowercase().contains(n) || state.lines_mention(s.lines(), n)
                })
            })
            .cloned()
            .collect();
        supplies.sort_by_key(|s| std::cmp::Reverse((s.state().created_at, s.id_typed())));
        Ok(supplies)
    }

    async fn active_shift(&self) -> Result<Option<Shift>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.shifts.values().find(|s| s.active).cloned())
    }

    async fn ledger_entries(
        &self,
        filter: &LedgerFilter,
        page: Pagination,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .ledger
            .iter()
            .rev()
            .filter(|e| filter.product_id.is_none_or(|id| e.product_id == id))
            .filter(|e| filter.order_id.is_none_or(|id| e.order_id == Some(id)))
            .filter(|e| filter.supply_id.is_none_or(|id| e.supply_id == Some(id)))
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }
}

/// Holds the store lock for its whole lifetime.
struct InMemoryTx {
    guard: OwnedMutexGuard<State>,
    work: State,
}

#[async_trait]
impl WarehouseTx for InMemoryTx {
    async fn active_shift(&mut self) -> Result<Option<Shift>, StoreError> {
        Ok(self.work.shifts.values().find(|s| s.active).cloned())
    }

    async fn save_shift(&mut self, shift: &Shift) -> Result<(), StoreError> {
        if shift.active
            && self
                .work
                .shifts
                .values()
                .any(|s| s.active && s.id != shift.id)
        {
            return Err(StoreError::Conflict("another shift is active".to_string()));
        }
        self.work.shifts.insert(shift.id, shift.clone());
        Ok(())
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.work.products.get(&id).cloned())
    }

    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids
            .iter()
            .filter_map(|id| self.work.products.get(id).cloned())
            .collect())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        if self.work.products.contains_key(&product.id_typed()) {
            return Err(StoreError::Conflict(format!(
                "product {} already exists",
                product.id_typed()
            )));
        }
        self.work.products.insert(product.id_typed(), product.clone());
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        self.work.products.insert(product.id_typed(), product.clone());
        Ok(())
    }

    async fn referenced_products(&mut self, ids: &[ProductId]) -> Result<Vec<ProductId>, StoreError> {
        let work = &self.work;
        let mut referenced: Vec<ProductId> = ids
            .iter()
            .copied()
            .filter(|id| {
                work.orders.values().any(|o| o.lines().contains(*id))
                    || work.supplies.values().any(|s| s.lines().contains(*id))
            })
            .collect();
        referenced.sort();
        referenced.dedup();
        Ok(referenced)
    }

    async fn delete_products(&mut self, ids: &[ProductId]) -> Result<u64, StoreError> {
        let mut removed = 0;
        for id in ids {
            if self.work.products.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn driver_exists(&mut self, id: DriverId) -> Result<bool, StoreError> {
        Ok(self.work.drivers.contains_key(&id))
    }

    async fn car_exists(&mut self, id: CarId) -> Result<bool, StoreError> {
        Ok(self.work.cars.contains_key(&id))
    }

    async fn car_number_taken(&mut self, number: &str) -> Result<bool, StoreError> {
        Ok(self.work.cars.values().any(|c| c.number == number))
    }

    async fn insert_driver(&mut self, driver: &Driver) -> Result<(), StoreError> {
        self.work.drivers.insert(driver.id, driver.clone());
        Ok(())
    }

    async fn insert_car(&mut self, car: &Car) -> Result<(), StoreError> {
        if self.car_number_taken(&car.number).await? {
            return Err(StoreError::Conflict(format!(
                "car number '{}' is already registered",
                car.number
            )));
        }
        self.work.cars.insert(car.id, car.clone());
        Ok(())
    }

    async fn delete_driver(&mut self, id: DriverId) -> Result<bool, StoreError> {
        if self.work.drivers.remove(&id).is_none() {
            return Ok(false);
        }
        for order in self.work.orders.values_mut() {
            if order.state().driver_id == Some(id) {
                let mut state = order.state().clone();
                state.driver_id = None;
                *order = Order::restore(order.id_typed(), state, order.version());
            }
        }
        Ok(true)
    }

    async fn delete_car(&mut self, id: CarId) -> Result<bool, StoreError> {
        if self.work.cars.remove(&id).is_none() {
            return Ok(false);
        }
        for order in self.work.orders.values_mut() {
            if order.state().car_id == Some(id) {
                let mut state = order.state().clone();
                state.car_id = None;
                *order = Order::restore(order.id_typed(), state, order.version());
            }
        }
        Ok(true)
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.work.orders.get(&id).cloned())
    }

    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError> {
        self.work.orders.insert(order.id_typed(), order.clone());
        Ok(())
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<(), StoreError> {
        self.work.orders.remove(&id);
        for entry in self.work.ledger.iter_mut() {
            if entry.order_id == Some(id) {
                entry.order_id = None;
            }
        }
        Ok(())
    }

    async fn lock_supply(&mut self, id: SupplyId) -> Result<Option<Supply>, StoreError> {
        Ok(self.work.supplies.get(&id).cloned())
    }

    async fn save_supply(&mut self, supply: &Supply) -> Result<(), StoreError> {
        self.work.supplies.insert(supply.id_typed(), supply.clone());
        Ok(())
    }

    async fn delete_supply(&mut self, id: SupplyId) -> Result<(), StoreError> {
        self.work.supplies.remove(&id);
        for entry in self.work.ledger.iter_mut() {
            if entry.supply_id == Some(id) {
                entry.supply_id = None;
            }
        }
        Ok(())
    }

    async fn append_ledger(&mut self, entries: &[LedgerEntry]) -> Result<(), StoreError> {
        self.work.ledger.extend_from_slice(entries);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockroom_products::ProductDetails;

    fn product(name: &str) -> Product {
        Product::restore(ProductId::new(), ProductDetails::new(name, "Acme", 10), 5, 1)
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_state_untouched() {
        let store = InMemoryWarehouseStore::new();
        let p = product("Film");

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        drop(tx);
        assert!(store.get_product(p.id_typed()).await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.get_product(p.id_typed()).await.unwrap(), Some(p));
    }

    #[tokio::test]
    async fn only_one_shift_may_be_active() {
        let store = InMemoryWarehouseStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.save_shift(&Shift::open(ShiftId::new(), Utc::now())).await.unwrap();
        let err = tx
            .save_shift(&Shift::open(ShiftId::new(), Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn product_search_is_case_insensitive_and_sorted() {
        let store = InMemoryWarehouseStore::new();
        let mut tx = store.begin().await.unwrap();
        for name in ["Tape", "stretch film", "Film roll"] {
            tx.insert_product(&product(name)).await.unwrap();
        }
        tx.commit().await.unwrap();

        let found = store
            .list_products(&ProductFilter {
                search: Some(" FILM ".to_string()),
            })
            .await
            .unwrap();
        let names: Vec<&str> = found.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["Film roll", "stretch film"]);
    }

    #[tokio::test]
    async fn duplicate_car_number_conflicts() {
        let store = InMemoryWarehouseStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_car(&Car::register(CarId::new(), "AA 1").unwrap()).await.unwrap();
        let err = tx
            .insert_car(&Car::register(CarId::new(), "aa 1").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
