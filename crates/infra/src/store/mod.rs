//! Warehouse storage boundary.
//!
//! One trait, two backends: an in-memory store for tests/dev and a Postgres
//! store for production. Both give every write a single atomic transaction.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

use std::sync::Arc;

use tracing::info;

pub use in_memory::InMemoryWarehouseStore;
pub use postgres::PostgresWarehouseStore;
pub use r#trait::{
    LedgerFilter, OrderFilter, Pagination, ProductFilter, StoreError, SupplyFilter,
    WarehouseStore, WarehouseTx,
};

use crate::config::AppConfig;

/// Open the store the configuration asks for, running migrations on Postgres.
pub async fn open(config: &AppConfig) -> Result<Arc<dyn WarehouseStore>, StoreError> {
    match &config.database_url {
        Some(url) => {
            let store =
                PostgresWarehouseStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            info!("using postgres warehouse store");
            Ok(Arc::new(store))
        }
        None => {
            info!("DATABASE_URL not set, using in-memory warehouse store");
            Ok(Arc::new(InMemoryWarehouseStore::new()))
        }
    }
}
