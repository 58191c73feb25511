pub mod scan;
pub mod warehouse;

pub use scan::{Resolution, ScanResolver, load_scan_file};
pub use warehouse::{ConnectionConfig, WarehouseProfile, load_warehouse_profile};
