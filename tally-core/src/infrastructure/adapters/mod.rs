// tally-core/src/infrastructure/adapters/mod.rs

pub mod duckdb;

use std::sync::Arc;

use crate::infrastructure::config::warehouse::{ConnectionConfig, WarehouseProfile};
use crate::infrastructure::error::InfrastructureError;
use crate::ports::warehouse::Warehouse;

pub use self::duckdb::{DuckDbDialect, DuckDbWarehouse};

/// Opens the warehouse a profile points to.
pub fn connect(profile: &WarehouseProfile) -> Result<Arc<dyn Warehouse>, InfrastructureError> {
    match &profile.connection {
        ConnectionConfig::Duckdb { path } => {
            Ok(Arc::new(DuckDbWarehouse::new(&profile.name, path)?))
        }
    }
}
