// tally-core/src/ports/warehouse.rs

// The warehouse is the only slow collaborator of a scan: it owns connections,
// timeouts and cancellation. The core hands it SQL text and gets values back.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::scan::measurement::MetricValue;
use crate::error::TallyError;
use crate::ports::dialect::Dialect;

/// One column of the scanned table, in the warehouse's declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<MetricValue>>,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn first(&self) -> Option<&[MetricValue]> {
        self.rows.first().map(Vec::as_slice)
    }
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    fn name(&self) -> &str;

    fn dialect(&self) -> &dyn Dialect;

    async fn fetch_columns(&self, table_name: &str) -> Result<Vec<ColumnMetadata>, TallyError>;

    /// Runs a query that must return exactly one row.
    async fn execute_query_one(&self, sql: &str) -> Result<Vec<MetricValue>, TallyError>;

    async fn execute_query_all(&self, sql: &str) -> Result<QueryResult, TallyError>;
}
