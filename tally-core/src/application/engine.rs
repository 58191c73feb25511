// tally-core/src/application/engine.rs

use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::domain::scan::measurement::MetricValue;
use crate::error::TallyError;
use crate::ports::warehouse::{QueryResult, Warehouse};

/// Runs a single-row query with timing logs. Used for the aggregation query.
#[instrument(skip(warehouse, sql), fields(warehouse = warehouse.name(), query.len = sql.len()))]
pub async fn fetch_one(warehouse: &dyn Warehouse, sql: &str) -> Result<Vec<MetricValue>, TallyError> {
    let start = Instant::now();
    debug!("⚡ Executing Query: {}", sql);

    let result = warehouse.execute_query_one(sql).await;
    let duration = start.elapsed();

    match result {
        Ok(row) => {
            debug!("✅ Query finished in {:.2?} ({} values)", duration, row.len());
            Ok(row)
        }
        Err(e) => {
            error!("❌ Query failed after {:.2?}: {}", duration, e);
            Err(e)
        }
    }
}

/// Runs a query returning any number of rows (SQL metrics).
#[instrument(skip(warehouse, sql), fields(warehouse = warehouse.name(), query.len = sql.len()))]
pub async fn fetch_all(warehouse: &dyn Warehouse, sql: &str) -> Result<QueryResult, TallyError> {
    let start = Instant::now();
    debug!("⚡ Executing Query: {}", sql);

    let result = warehouse.execute_query_all(sql).await;
    let duration = start.elapsed();

    match result {
        Ok(rows) => {
            debug!("✅ Query finished in {:.2?} ({} rows)", duration, rows.row_count());
            Ok(rows)
        }
        Err(e) => {
            error!("❌ Query failed after {:.2?}: {}", duration, e);
            Err(e)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::duckdb::DuckDbWarehouse;
    use anyhow::Result;

    #[tokio::test]
    async fn test_fetch_one_and_all() -> Result<()> {
        let warehouse = DuckDbWarehouse::in_memory()?;
        warehouse.execute_batch("CREATE TABLE t AS SELECT * FROM range(3) r(i);")?;

        let row = fetch_one(&warehouse, "SELECT COUNT(*), SUM(i) FROM t").await?;
        assert_eq!(row, vec![MetricValue::Integer(3), MetricValue::Integer(3)]);

        let rows = fetch_all(&warehouse, "SELECT i FROM t ORDER BY i").await?;
        assert_eq!(rows.row_count(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_errors_propagate_unchanged() -> Result<()> {
        let warehouse = DuckDbWarehouse::in_memory()?;
        let result = fetch_one(&warehouse, "SELECT * FROM missing_table").await;
        assert!(matches!(result, Err(TallyError::Infrastructure(_))));
        Ok(())
    }
}
