//! Postgres-backed warehouse store.
//!
//! Every [`WarehouseTx`] wraps one SQL transaction. `lock_*` reads use
//! `SELECT ... FOR UPDATE` so balance checks, status checks and the shift
//! gate hold until commit.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `Conflict` |
//! | Database (other) | Any other | `Database` |
//! | ColumnDecode / ColumnNotFound | N/A | `Decode` |
//! | Other | N/A | `Database` |

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockroom_core::{
    ActorId, AggregateRoot, CarId, DriverId, LedgerEntryId, OrderId, ProductId, ShiftId,
    SupplyId,
};
use stockroom_fleet::{Car, Driver};
use stockroom_inventory::{LedgerEntry, LineSet, StockLine};
use stockroom_orders::{Order, OrderState};
use stockroom_products::{Product, ProductDetails};
use stockroom_shifts::Shift;
use stockroom_supplies::{Supply, SupplyState};

use super::r#trait::{
    needle, LedgerFilter, OrderFilter, Pagination, ProductFilter, StoreError, SupplyFilter,
    WarehouseStore, WarehouseTx,
};

const MIGRATION: &str = include_str!("../../migrations/0001_init.sql");

const PRODUCT_COLUMNS: &str =
    "id, name, company, balance, units_per_pallet, low_threshold, normal_threshold, notes, version";
const ORDER_COLUMNS: &str = "id, customer, notes, delivery_date, shift_id, driver_id, car_id, \
                             status, archived, created_at, version";
const SUPPLY_COLUMNS: &str = "id, supplier, status, created_at, version";
const SHIFT_COLUMNS: &str = "id, started_at, ended_at, active";
const LEDGER_COLUMNS: &str = "id, product_id, change, balance_after, cause, actor, order_id, \
                              supply_id, note, recorded_at";

/// Postgres-backed warehouse store.
#[derive(Debug, Clone)]
pub struct PostgresWarehouseStore {
    pool: Arc<PgPool>,
}

impl PostgresWarehouseStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl WarehouseStore for PostgresWarehouseStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn WarehouseTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresTx { tx }))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        Ok(row.map(Product::from))
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE ($1::text IS NULL OR name ILIKE $1 OR company ILIKE $1) \
             ORDER BY name, id"
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(like_pattern(&filter.search))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn list_drivers(&self) -> Result<Vec<Driver>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, String)>("SELECT id, name FROM drivers ORDER BY name, id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_drivers", e))?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| Driver {
                id: DriverId::from_uuid(id),
                name,
            })
            .collect())
    }

    async fn list_cars(&self) -> Result<Vec<Car>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, String)>("SELECT id, number FROM cars ORDER BY number")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_cars", e))?;
        Ok(rows
            .into_iter()
            .map(|(id, number)| Car {
                id: CarId::from_uuid(id),
                number,
            })
            .collect())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let head = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;
        match head {
            Some(head) => {
                let mut lines = fetch_lines(&*self.pool, LineTable::Order, &[head.id]).await?;
                let lines = lines.remove(&head.id).unwrap_or_default();
                Ok(Some(head.into_order(lines)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders o \
             WHERE ($1::boolean IS NULL OR o.archived = $1) \
               AND ($2::date IS NULL OR o.delivery_date = $2) \
               AND ($3::text IS NULL OR o.customer ILIKE $3 OR EXISTS ( \
                     SELECT 1 FROM order_lines l JOIN products p ON p.id = l.product_id \
                     WHERE l.order_id = o.id AND p.name ILIKE $3)) \
             ORDER BY o.delivery_date, o.created_at, o.id"
        );
        let heads = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(filter.archived)
            .bind(filter.delivery_date)
            .bind(like_pattern(&filter.search))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_orders", e))?;

        let ids: Vec<Uuid> = heads.iter().map(|h| h.id).collect();
        let mut lines = fetch_lines(&*self.pool, LineTable::Order, &ids).await?;
        heads
            .into_iter()
            .map(|head| {
                let own = lines.remove(&head.id).unwrap_or_default();
                head.into_order(own)
            })
            .collect()
    }

    async fn get_supply(&self, id: SupplyId) -> Result<Option<Supply>, StoreError> {
        let sql = format!("SELECT {SUPPLY_COLUMNS} FROM supplies WHERE id = $1");
        let head = sqlx::query_as::<_, SupplyRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_supply", e))?;
        match head {
            Some(head) => {
                let mut lines = fetch_lines(&*self.pool, LineTable::Supply, &[head.id]).await?;
                let lines = lines.remove(&head.id).unwrap_or_default();
                Ok(Some(head.into_supply(lines)?))
            }
            None => Ok(None),
        }
    }

    async fn list_supplies(&self, filter: &SupplyFilter) -> Result<Vec<Supply>, StoreError> {
        let sql = format!(
            "SELECT {SUPPLY_COLUMNS} FROM supplies s \
             WHERE ($1::text IS NULL OR s.supplier ILIKE $1 OR EXISTS ( \
                     SELECT 1 FROM supply_lines l JOIN products p ON p.id = l.product_id \
                     WHERE l.supply_id = s.id AND p.name ILIKE $1)) \
             ORDER BY s.created_at DESC, s.id DESC"
        );
        let heads = sqlx::query_as::<_, SupplyRow>(&sql)
            .bind(like_pattern(&filter.search))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_supplies", e))?;

        let ids: Vec<Uuid> = heads.iter().map(|h| h.id).collect();
        let mut lines = fetch_lines(&*self.pool, LineTable::Supply, &ids).await?;
        heads
            .into_iter()
            .map(|head| {
                let own = lines.remove(&head.id).unwrap_or_default();
                head.into_supply(own)
            })
            .collect()
    }

    async fn active_shift(&self) -> Result<Option<Shift>, StoreError> {
        let sql = format!("SELECT {SHIFT_COLUMNS} FROM shifts WHERE active");
        let row = sqlx::query_as::<_, ShiftRow>(&sql)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("active_shift", e))?;
        Ok(row.map(Shift::from))
    }

    #[instrument(skip(self), err)]
    async fn ledger_entries(
        &self,
        filter: &LedgerFilter,
        page: Pagination,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let sql = format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries \
             WHERE ($1::uuid IS NULL OR product_id = $1) \
               AND ($2::uuid IS NULL OR order_id = $2) \
               AND ($3::uuid IS NULL OR supply_id = $3) \
             ORDER BY seq DESC \
             LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(filter.product_id.map(Uuid::from))
            .bind(filter.order_id.map(Uuid::from))
            .bind(filter.supply_id.map(Uuid::from))
            .bind(i64::from(page.limit))
            .bind(i64::from(page.offset))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ledger_entries", e))?;
        rows.into_iter().map(LedgerRow::into_entry).collect()
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl WarehouseTx for PostgresTx {
    async fn active_shift(&mut self) -> Result<Option<Shift>, StoreError> {
        let sql = format!("SELECT {SHIFT_COLUMNS} FROM shifts WHERE active FOR UPDATE");
        let row = sqlx::query_as::<_, ShiftRow>(&sql)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_active_shift", e))?;
        Ok(row.map(Shift::from))
    }

    async fn save_shift(&mut self, shift: &Shift) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO shifts (id, started_at, ended_at, active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                ended_at = EXCLUDED.ended_at,
                active = EXCLUDED.active
            "#,
        )
        .bind(*shift.id.as_uuid())
        .bind(shift.started_at)
        .bind(shift.ended_at)
        .bind(shift.active)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_shift", e))?;
        Ok(())
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_product", e))?;
        Ok(row.map(Product::from))
    }

    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        // Id order keeps concurrent lockers from deadlocking.
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(uuids(ids))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_products", e))?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        let d = product.details();
        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, company, balance, units_per_pallet,
                low_threshold, normal_threshold, notes, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(*product.id_typed().as_uuid())
        .bind(&d.name)
        .bind(&d.company)
        .bind(product.balance())
        .bind(d.units_per_pallet)
        .bind(d.low_threshold)
        .bind(d.normal_threshold)
        .bind(&d.notes)
        .bind(product.version() as i64)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        let d = product.details();
        sqlx::query(
            r#"
            UPDATE products SET
                name = $2, company = $3, balance = $4, units_per_pallet = $5,
                low_threshold = $6, normal_threshold = $7, notes = $8, version = $9
            WHERE id = $1
            "#,
        )
        .bind(*product.id_typed().as_uuid())
        .bind(&d.name)
        .bind(&d.company)
        .bind(product.balance())
        .bind(d.units_per_pallet)
        .bind(d.low_threshold)
        .bind(d.normal_threshold)
        .bind(&d.notes)
        .bind(product.version() as i64)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;
        Ok(())
    }

    async fn referenced_products(&mut self, ids: &[ProductId]) -> Result<Vec<ProductId>, StoreError> {
        let rows = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT product_id FROM order_lines WHERE product_id = ANY($1)
            UNION
            SELECT product_id FROM supply_lines WHERE product_id = ANY($1)
            ORDER BY 1
            "#,
        )
        .bind(uuids(ids))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("referenced_products", e))?;
        Ok(rows.into_iter().map(ProductId::from_uuid).collect())
    }

    async fn delete_products(&mut self, ids: &[ProductId]) -> Result<u64, StoreError> {
        let done = sqlx::query("DELETE FROM products WHERE id = ANY($1)")
            .bind(uuids(ids))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_products", e))?;
        Ok(done.rows_affected())
    }

    async fn driver_exists(&mut self, id: DriverId) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM drivers WHERE id = $1)")
            .bind(*id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("driver_exists", e))
    }

    async fn car_exists(&mut self, id: CarId) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM cars WHERE id = $1)")
            .bind(*id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("car_exists", e))
    }

    async fn car_number_taken(&mut self, number: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM cars WHERE number = $1)")
            .bind(number)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("car_number_taken", e))
    }

    async fn insert_driver(&mut self, driver: &Driver) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO drivers (id, name) VALUES ($1, $2)")
            .bind(*driver.id.as_uuid())
            .bind(&driver.name)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_driver", e))?;
        Ok(())
    }

    async fn insert_car(&mut self, car: &Car) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO cars (id, number) VALUES ($1, $2)")
            .bind(*car.id.as_uuid())
            .bind(&car.number)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_car", e))?;
        Ok(())
    }

    async fn delete_driver(&mut self, id: DriverId) -> Result<bool, StoreError> {
        let done = sqlx::query("DELETE FROM drivers WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_driver", e))?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete_car(&mut self, id: CarId) -> Result<bool, StoreError> {
        let done = sqlx::query("DELETE FROM cars WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_car", e))?;
        Ok(done.rows_affected() > 0)
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let head = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_order", e))?;
        match head {
            Some(head) => {
                let mut lines = fetch_lines(&mut *self.tx, LineTable::Order, &[head.id]).await?;
                let lines = lines.remove(&head.id).unwrap_or_default();
                Ok(Some(head.into_order(lines)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, order), fields(order_id = %order.id_typed()), err)]
    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let s = order.state();
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer, notes, delivery_date, shift_id, driver_id, car_id,
                status, archived, created_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                customer = EXCLUDED.customer,
                notes = EXCLUDED.notes,
                delivery_date = EXCLUDED.delivery_date,
                driver_id = EXCLUDED.driver_id,
                car_id = EXCLUDED.car_id,
                status = EXCLUDED.status,
                archived = EXCLUDED.archived,
                version = EXCLUDED.version
            "#,
        )
        .bind(*order.id_typed().as_uuid())
        .bind(&s.customer)
        .bind(&s.notes)
        .bind(s.delivery_date)
        .bind(s.shift_id.map(Uuid::from))
        .bind(s.driver_id.map(Uuid::from))
        .bind(s.car_id.map(Uuid::from))
        .bind(s.status.as_str())
        .bind(s.archived)
        .bind(s.created_at)
        .bind(order.version() as i64)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_order", e))?;

        replace_lines(&mut self.tx, LineTable::Order, *order.id_typed().as_uuid(), &s.lines).await
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?;
        Ok(())
    }

    async fn lock_supply(&mut self, id: SupplyId) -> Result<Option<Supply>, StoreError> {
        let sql = format!("SELECT {SUPPLY_COLUMNS} FROM supplies WHERE id = $1 FOR UPDATE");
        let head = sqlx::query_as::<_, SupplyRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_supply", e))?;
        match head {
            Some(head) => {
                let mut lines = fetch_lines(&mut *self.tx, LineTable::Supply, &[head.id]).await?;
                let lines = lines.remove(&head.id).unwrap_or_default();
                Ok(Some(head.into_supply(lines)?))
            }
            None => Ok(None),
        }
    }

    async fn save_supply(&mut self, supply: &Supply) -> Result<(), StoreError> {
        let s = supply.state();
        sqlx::query(
            r#"
            INSERT INTO supplies (id, supplier, status, created_at, version)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                supplier = EXCLUDED.supplier,
                status = EXCLUDED.status,
                version = EXCLUDED.version
            "#,
        )
        .bind(*supply.id_typed().as_uuid())
        .bind(&s.supplier)
        .bind(s.status.as_str())
        .bind(s.created_at)
        .bind(supply.version() as i64)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_supply", e))?;

        replace_lines(&mut self.tx, LineTable::Supply, *supply.id_typed().as_uuid(), &s.lines).await
    }

    async fn delete_supply(&mut self, id: SupplyId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM supplies WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_supply", e))?;
        Ok(())
    }

    async fn append_ledger(&mut self, entries: &[LedgerEntry]) -> Result<(), StoreError> {
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO ledger_entries (
                    id, product_id, change, balance_after, cause,
                    actor, order_id, supply_id, note, recorded_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(*entry.id.as_uuid())
            .bind(*entry.product_id.as_uuid())
            .bind(entry.change)
            .bind(entry.balance_after)
            .bind(entry.cause.as_str())
            .bind(entry.actor.map(Uuid::from))
            .bind(entry.order_id.map(Uuid::from))
            .bind(entry.supply_id.map(Uuid::from))
            .bind(&entry.note)
            .bind(entry.recorded_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("append_ledger", e))?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

#[derive(Debug, Clone, Copy)]
enum LineTable {
    Order,
    Supply,
}

impl LineTable {
    fn select_sql(self) -> &'static str {
        match self {
            LineTable::Order => {
                "SELECT order_id, product_id, quantity FROM order_lines \
                 WHERE order_id = ANY($1) ORDER BY order_id, product_id"
            }
            LineTable::Supply => {
                "SELECT supply_id, product_id, quantity FROM supply_lines \
                 WHERE supply_id = ANY($1) ORDER BY supply_id, product_id"
            }
        }
    }

    fn delete_sql(self) -> &'static str {
        match self {
            LineTable::Order => "DELETE FROM order_lines WHERE order_id = $1",
            LineTable::Supply => "DELETE FROM supply_lines WHERE supply_id = $1",
        }
    }

    fn insert_sql(self) -> &'static str {
        match self {
            LineTable::Order => {
                "INSERT INTO order_lines (order_id, product_id, quantity) \
                 SELECT $1, * FROM UNNEST($2::uuid[], $3::bigint[])"
            }
            LineTable::Supply => {
                "INSERT INTO supply_lines (supply_id, product_id, quantity) \
                 SELECT $1, * FROM UNNEST($2::uuid[], $3::bigint[])"
            }
        }
    }
}

async fn fetch_lines<'e>(
    exec: impl PgExecutor<'e>,
    table: LineTable,
    owners: &[Uuid],
) -> Result<BTreeMap<Uuid, Vec<StockLine>>, StoreError> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid, i64)>(table.select_sql())
        .bind(owners.to_vec())
        .fetch_all(exec)
        .await
        .map_err(|e| map_sqlx_error("fetch_lines", e))?;

    let mut out: BTreeMap<Uuid, Vec<StockLine>> = BTreeMap::new();
    for (owner, product_id, quantity) in rows {
        out.entry(owner)
            .or_default()
            .push(StockLine::new(ProductId::from_uuid(product_id), quantity));
    }
    Ok(out)
}

async fn replace_lines(
    tx: &mut Transaction<'static, Postgres>,
    table: LineTable,
    owner: Uuid,
    lines: &LineSet,
) -> Result<(), StoreError> {
    sqlx::query(table.delete_sql())
        .bind(owner)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("delete_lines", e))?;

    let lines = lines.to_lines();
    if lines.is_empty() {
        return Ok(());
    }
    let products: Vec<Uuid> = lines.iter().map(|l| *l.product_id.as_uuid()).collect();
    let quantities: Vec<i64> = lines.iter().map(|l| l.quantity).collect();
    sqlx::query(table.insert_sql())
        .bind(owner)
        .bind(products)
        .bind(quantities)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_lines", e))?;
    Ok(())
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

/// `%needle%` with LIKE wildcards escaped, `None` for a blank search.
fn like_pattern(search: &Option<String>) -> Option<String> {
    needle(search).map(|n| {
        let escaped = n
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        format!("%{escaped}%")
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation / foreign key violation
                Some("23505") | Some("23503") => StoreError::Conflict(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::Decode(_) => {
            StoreError::Decode(format!("{operation}: {err}"))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    id: Uuid,
    name: String,
    company: String,
    balance: i64,
    units_per_pallet: i64,
    low_threshold: i64,
    normal_threshold: i64,
    notes: Option<String>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            company: row.try_get("company")?,
            balance: row.try_get("balance")?,
            units_per_pallet: row.try_get("units_per_pallet")?,
            low_threshold: row.try_get("low_threshold")?,
            normal_threshold: row.try_get("normal_threshold")?,
            notes: row.try_get("notes")?,
            version: row.try_get("version")?,
        })
    }
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        let details = ProductDetails {
            name: row.name,
            company: row.company,
            units_per_pallet: row.units_per_pallet,
            low_threshold: row.low_threshold,
            normal_threshold: row.normal_threshold,
            notes: row.notes,
        };
        Product::restore(
            ProductId::from_uuid(row.id),
            details,
            row.balance,
            row.version as u64,
        )
    }
}

#[derive(Debug)]
struct OrderRow {
    id: Uuid,
    customer: String,
    notes: Option<String>,
    delivery_date: NaiveDate,
    shift_id: Option<Uuid>,
    driver_id: Option<Uuid>,
    car_id: Option<Uuid>,
    status: String,
    archived: bool,
    created_at: DateTime<Utc>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            customer: row.try_get("customer")?,
            notes: row.try_get("notes")?,
            delivery_date: row.try_get("delivery_date")?,
            shift_id: row.try_get("shift_id")?,
            driver_id: row.try_get("driver_id")?,
            car_id: row.try_get("car_id")?,
            status: row.try_get("status")?,
            archived: row.try_get("archived")?,
            created_at: row.try_get("created_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl OrderRow {
    fn into_order(self, lines: Vec<StockLine>) -> Result<Order, StoreError> {
        let status = self
            .status
            .parse()
            .map_err(|e| StoreError::Decode(format!("order {}: {e}", self.id)))?;
        let lines = LineSet::from_lines(&lines)
            .map_err(|e| StoreError::Decode(format!("order {} lines: {e}", self.id)))?;
        let state = OrderState {
            customer: self.customer,
            notes: self.notes,
            delivery_date: self.delivery_date,
            shift_id: self.shift_id.map(ShiftId::from_uuid),
            driver_id: self.driver_id.map(DriverId::from_uuid),
            car_id: self.car_id.map(CarId::from_uuid),
            status,
            archived: self.archived,
            lines,
            created_at: self.created_at,
        };
        Ok(Order::restore(
            OrderId::from_uuid(self.id),
            state,
            self.version as u64,
        ))
    }
}

#[derive(Debug)]
struct SupplyRow {
    id: Uuid,
    supplier: String,
    status: String,
    created_at: DateTime<Utc>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for SupplyRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SupplyRow {
            id: row.try_get("id")?,
            supplier: row.try_get("supplier")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl SupplyRow {
    fn into_supply(self, lines: Vec<StockLine>) -> Result<Supply, StoreError> {
        let status = self
            .status
            .parse()
            .map_err(|e| StoreError::Decode(format!("supply {}: {e}", self.id)))?;
        let lines = LineSet::from_lines(&lines)
            .map_err(|e| StoreError::Decode(format!("supply {} lines: {e}", self.id)))?;
        Ok(Supply::restore(
            SupplyId::from_uuid(self.id),
            SupplyState {
                supplier: self.supplier,
                status,
                lines,
                created_at: self.created_at,
            },
            self.version as u64,
        ))
    }
}

#[derive(Debug)]
struct ShiftRow {
    id: Uuid,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    active: bool,
}

impl<'r> FromRow<'r, PgRow> for ShiftRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ShiftRow {
            id: row.try_get("id")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            active: row.try_get("active")?,
        })
    }
}

impl From<ShiftRow> for Shift {
    fn from(row: ShiftRow) -> Self {
        Shift {
            id: ShiftId::from_uuid(row.id),
            started_at: row.started_at,
            ended_at: row.ended_at,
            active: row.active,
        }
    }
}

#[derive(Debug)]
struct LedgerRow {
    id: Uuid,
    product_id: Uuid,
    change: i64,
    balance_after: i64,
    cause: String,
    actor: Option<Uuid>,
    order_id: Option<Uuid>,
    supply_id: Option<Uuid>,
    note: String,
    recorded_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for LedgerRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(LedgerRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            change: row.try_get("change")?,
            balance_after: row.try_get("balance_after")?,
            cause: row.try_get("cause")?,
            actor: row.try_get("actor")?,
            order_id: row.try_get("order_id")?,
            supply_id: row.try_get("supply_id")?,
            note: row.try_get("note")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

impl LedgerRow {
    fn into_entry(self) -> Result<LedgerEntry, StoreError> {
        let cause = self
            .cause
            .parse()
            .map_err(|e| StoreError::Decode(format!("ledger entry {}: {e}", self.id)))?;
        Ok(LedgerEntry {
            id: LedgerEntryId::from_uuid(self.id),
            product_id: ProductId::from_uuid(self.product_id),
            change: self.change,
            balance_after: self.balance_after,
            cause,
            actor: self.actor.map(ActorId::from_uuid),
            order_id: self.order_id.map(OrderId::from_uuid),
            supply_id: self.supply_id.map(SupplyId::from_uuid),
            note: self.note,
            recorded_at: self.recorded_at,
        })
    }
}
