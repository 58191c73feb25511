// tally-core/src/infrastructure/adapters/duckdb.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use duckdb::types::{TimeUnit, Value};
use duckdb::{Config, Connection};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

// Imports Hexagonaux
use crate::domain::scan::measurement::MetricValue;
use crate::error::TallyError;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};
use crate::ports::dialect::Dialect;
use crate::ports::warehouse::{ColumnMetadata, QueryResult, Warehouse};

// =============================================================================
//  DIALECT
// =============================================================================

const DUCKDB_TEXT_TYPES: &[&str] = &["VARCHAR", "CHAR", "BPCHAR", "TEXT", "STRING"];
const DUCKDB_NUMBER_TYPES: &[&str] = &[
    "TINYINT",
    "SMALLINT",
    "INTEGER",
    "INT",
    "BIGINT",
    "HUGEINT",
    "UTINYINT",
    "USMALLINT",
    "UINTEGER",
    "UBIGINT",
    "UHUGEINT",
    "FLOAT",
    "REAL",
    "DOUBLE",
    "DECIMAL",
    "NUMERIC",
];
const DUCKDB_TIME_TYPES: &[&str] = &["DATE", "TIME", "TIMESTAMP", "TIMESTAMPTZ"];

#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDbDialect;

impl Dialect for DuckDbDialect {
    fn name(&self) -> &str {
        "duckdb"
    }

    fn text_types(&self) -> &[&str] {
        DUCKDB_TEXT_TYPES
    }

    fn number_types(&self) -> &[&str] {
        DUCKDB_NUMBER_TYPES
    }

    fn time_types(&self) -> &[&str] {
        DUCKDB_TIME_TYPES
    }

    fn decimal_type(&self) -> &str {
        "DOUBLE"
    }

    fn sql_expr_regexp_like(&self, expr: &str, pattern: &str) -> String {
        format!("regexp_matches({}, {})", expr, self.literal_string(pattern))
    }

    // rows that fail the cast become NULL instead of aborting the scan
    fn sql_expr_cast(&self, expr: &str) -> String {
        format!("TRY_CAST({} AS {})", expr, self.decimal_type())
    }

    fn sql_table_sample(&self, method: &str, percentage: f64) -> String {
        format!(
            "TABLESAMPLE {}({}%)",
            method.to_lowercase(),
            self.literal_number(percentage)
        )
    }
}

// =============================================================================
//  WAREHOUSE
// =============================================================================

pub struct DuckDbWarehouse {
    name: String,
    conn: Arc<Mutex<Connection>>,
    dialect: DuckDbDialect,
}

impl DuckDbWarehouse {
    pub fn new(name: &str, db_path: &str) -> Result<Self, InfrastructureError> {
        let config = Config::default();

        let conn = if db_path == ":memory:" {
            Connection::open_in_memory_with_flags(config)?
        } else {
            Connection::open_with_flags(db_path, config)?
        };

        Ok(Self {
            name: name.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            dialect: DuckDbDialect,
        })
    }

    pub fn in_memory() -> Result<Self, InfrastructureError> {
        Self::new("memory", ":memory:")
    }

    /// Runs statements that return nothing (fixtures, setup scripts).
    pub fn execute_batch(&self, sql: &str) -> Result<(), InfrastructureError> {
        let conn = self.lock()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, InfrastructureError> {
        self.conn
            .lock()
            .map_err(|_| InfrastructureError::Database(DatabaseError::Poisoned))
    }

    fn query(&self, sql: &str) -> Result<QueryResult, InfrastructureError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;

        let columns = rows
            .as_ref()
            .map(|s| s.column_names())
            .unwrap_or_default();

        let mut result = QueryResult {
            columns,
            rows: Vec::new(),
        };
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(result.columns.len());
            for i in 0..result.columns.len() {
                values.push(to_metric_value(row.get::<_, Value>(i)?));
            }
            result.rows.push(values);
        }
        Ok(result)
    }
}

#[async_trait]
impl Warehouse for DuckDbWarehouse {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn fetch_columns(&self, table_name: &str) -> Result<Vec<ColumnMetadata>, TallyError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!(
                "PRAGMA table_info({})",
                self.dialect.literal_string(table_name)
            ))
            .map_err(InfrastructureError::from)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(ColumnMetadata {
                    name: row.get("name")?,
                    data_type: row.get("type")?,
                    nullable: !row.get::<_, bool>("notnull")?,
                })
            })
            .map_err(InfrastructureError::from)?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(row.map_err(InfrastructureError::from)?);
        }

        debug!(table = table_name, count = columns.len(), "Columns discovered");
        Ok(columns)
    }

    async fn execute_query_one(&self, sql: &str) -> Result<Vec<MetricValue>, TallyError> {
        let result = self.query(sql)?;
        result
            .rows
            .into_iter()
            .next()
            .ok_or_else(|| InfrastructureError::from(DatabaseError::EmptyResult(sql.to_string())))
            .map_err(TallyError::from)
    }

    async fn execute_query_all(&self, sql: &str) -> Result<QueryResult, TallyError> {
        Ok(self.query(sql)?)
    }
}

fn to_metric_value(value: Value) -> MetricValue {
    match value {
        Value::Null => MetricValue::Null,
        Value::Boolean(b) => MetricValue::Boolean(b),
        Value::TinyInt(i) => MetricValue::Integer(i64::from(i)),
        Value::SmallInt(i) => MetricValue::Integer(i64::from(i)),
        Value::Int(i) => MetricValue::Integer(i64::from(i)),
        Value::BigInt(i) => MetricValue::Integer(i),
        Value::HugeInt(i) => i64::try_from(i)
            .map(MetricValue::Integer)
            .unwrap_or(MetricValue::Decimal(i as f64)),
        Value::UTinyInt(i) => MetricValue::Integer(i64::from(i)),
        Value::USmallInt(i) => MetricValue::Integer(i64::from(i)),
        Value::UInt(i) => MetricValue::Integer(i64::from(i)),
        Value::UBigInt(i) => i64::try_from(i)
            .map(MetricValue::Integer)
            .unwrap_or(MetricValue::Decimal(i as f64)),
        Value::Float(f) => MetricValue::Decimal(f64::from(f)),
        Value::Double(f) => MetricValue::Decimal(f),
        Value::Decimal(d) => {
            let text = d.to_string();
            text.parse::<f64>()
                .map(MetricValue::Decimal)
                .unwrap_or(MetricValue::Text(text))
        }
        Value::Text(s) => MetricValue::Text(s),
        Value::Enum(s) => MetricValue::Text(s),
        Value::Date32(days) => NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
            .map(|d| MetricValue::Text(d.to_string()))
            .unwrap_or(MetricValue::Integer(i64::from(days))),
        Value::Timestamp(unit, raw) => {
            let micros = to_micros(unit, raw);
            DateTime::from_timestamp_micros(micros)
                .map(|t| MetricValue::Text(t.naive_utc().to_string()))
                .unwrap_or(MetricValue::Integer(raw))
        }
        other => MetricValue::Text(format!("{:?}", other)),
    }
}

// 1970-01-01 counted from 0001-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn to_micros(unit: TimeUnit, raw: i64) -> i64 {
    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}
