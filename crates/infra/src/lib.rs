//! Infrastructure layer: configuration, clock, storage and the warehouse service.

pub mod clock;
pub mod config;
pub mod service;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AppConfig, ConfigError};
pub use service::{NewProduct, ProductListing, ServiceError, WarehouseService};
pub use store::{
    InMemoryWarehouseStore, LedgerFilter, OrderFilter, Pagination, PostgresWarehouseStore,
    ProductFilter, StoreError, SupplyFilter, WarehouseStore, WarehouseTx,
};
