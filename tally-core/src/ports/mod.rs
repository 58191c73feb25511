// tally-core/src/ports/mod.rs

pub mod dialect;
pub mod warehouse;

pub use dialect::Dialect;
pub use warehouse::{ColumnMetadata, QueryResult, Warehouse};
