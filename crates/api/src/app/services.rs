//! Service wiring: which store and clock the warehouse service runs on.

use std::sync::Arc;

use stockroom_infra::{
    store, AppConfig, Clock, StoreError, SystemClock, WarehouseService, WarehouseStore,
};

/// Everything the handlers need, shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub warehouse: WarehouseService,
}

impl AppServices {
    pub fn new(store: Arc<dyn WarehouseStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            warehouse: WarehouseService::new(store, clock),
        }
    }
}

/// Postgres when `DATABASE_URL` is set, in-memory otherwise; wall clock.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    let store = store::open(config).await?;
    Ok(AppServices::new(store, Arc::new(SystemClock)))
}
