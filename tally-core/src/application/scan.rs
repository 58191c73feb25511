// tally-core/src/application/scan.rs

use chrono::{DateTime, Utc};
use serde_json::{Value as JsonValue, json};
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::application::engine;
use crate::application::evaluator;
use crate::application::query_builder::{AggregationQuery, AggregationQueryBuilder};
use crate::application::reducer;
use crate::application::sql_metrics::SqlMetricRunner;
use crate::domain::error::DomainError;
use crate::domain::scan::measurement::Measurement;
use crate::domain::scan::specification::ScanSpecification;
use crate::domain::scan::test_result::TestResult;
use crate::error::TallyError;
use crate::infrastructure::config::scan::Resolution;
use crate::ports::warehouse::{ColumnMetadata, Warehouse};

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Values for the filter template.
    pub variables: JsonValue,
    pub skip_sql_metrics: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            variables: json!({}),
            skip_sql_metrics: false,
        }
    }
}

/// Discovered columns plus the aggregation query compiled for them.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub columns: Vec<ColumnMetadata>,
    pub query: AggregationQuery,
}

#[derive(Debug, Clone)]
pub struct ScanResult {
    pub table: String,
    pub started_at: DateTime<Utc>,
    pub columns: Vec<ColumnMetadata>,
    pub measurements: Vec<Measurement>,
    pub test_results: Vec<TestResult>,
}

impl ScanResult {
    pub fn has_failures(&self) -> bool {
        self.test_results.iter().any(TestResult::is_failure)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.test_results.iter().filter(|r| r.is_failure())
    }

    pub fn to_json(&self) -> JsonValue {
        let failed = self.failures().count();
        json!({
            "table": self.table,
            "startedAt": self.started_at.to_rfc3339(),
            "columns": self.columns,
            "measurements": self.measurements,
            "testResults": self.test_results.iter().map(TestResult::to_json).collect::<Vec<_>>(),
            "summary": {
                "tests": self.test_results.len(),
                "failed": failed,
                "passed": self.test_results.len() - failed,
            },
        })
    }
}

/// Rejects a resolution carrying error diagnostics.
pub fn ensure_valid(resolution: &Resolution) -> Result<&ScanSpecification, DomainError> {
    if resolution.is_valid() {
        return Ok(&resolution.spec);
    }
    let errors: Vec<String> = resolution
        .diagnostics
        .errors()
        .map(ToString::to_string)
        .collect();
    Err(DomainError::InvalidSpecification(errors.join("; ")))
}

/// Discovers the table's columns and compiles the aggregation query, without executing it.
#[instrument(skip_all, fields(table = %spec.table_name))]
pub async fn plan_scan(
    warehouse: &dyn Warehouse,
    spec: &ScanSpecification,
    options: &ScanOptions,
) -> Result<ScanPlan, TallyError> {
    let columns = warehouse.fetch_columns(&spec.table_name).await?;
    if columns.is_empty() {
        return Err(DomainError::TableNotFound(spec.table_name.clone()).into());
    }

    for configured in spec.columns.keys() {
        if !columns.iter().any(|c| c.name.eq_ignore_ascii_case(configured)) {
            warn!(
                column = %configured,
                "⚠️  Configured column not found in table {}", spec.table_name
            );
        }
    }

    let query = AggregationQueryBuilder::new(warehouse.dialect()).build(
        spec,
        &columns,
        &options.variables,
    )?;
    Ok(ScanPlan { columns, query })
}

/// Full scan: discovery, one aggregation query, derivations, SQL metrics, tests.
#[instrument(skip_all, fields(warehouse = warehouse.name()))]
pub async fn run_scan(
    warehouse: &dyn Warehouse,
    resolution: &Resolution,
    options: &ScanOptions,
) -> Result<ScanResult, TallyError> {
    let spec = ensure_valid(resolution)?;
    let started_at = Utc::now();
    let start = Instant::now();
    info!("🔍 Scanning table '{}'", spec.table_name);

    let plan = plan_scan(warehouse, spec, options).await?;

    let values = engine::fetch_one(warehouse, &plan.query.sql).await?;
    let mut measurements = reducer::reduce(values, &plan.query.descriptors())?;
    let derived = reducer::derive(&measurements);
    measurements.extend(derived);

    let mut sql_test_results = Vec::new();
    if options.skip_sql_metrics {
        info!("⏭️  SQL metrics skipped");
    } else {
        let outcome = SqlMetricRunner::new(warehouse).run(spec).await?;
        measurements.extend(outcome.measurements);
        sql_test_results = outcome.test_results;
    }

    let mut test_results = evaluator::evaluate_tests(spec, &measurements);
    test_results.extend(sql_test_results);

    let result = ScanResult {
        table: spec.table_name.clone(),
        started_at,
        columns: plan.columns,
        measurements,
        test_results,
    };

    info!(
        "✅ Scan of '{}' finished in {:.2?}: {} measurements, {} tests, {} failed",
        result.table,
        start.elapsed(),
        result.measurements.len(),
        result.test_results.len(),
        result.failures().count()
    );
    Ok(result)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::scan::measurement::MetricValue;
    use crate::infrastructure::adapters::duckdb::DuckDbWarehouse;
    use crate::infrastructure::config::scan::ScanResolver;
    use anyhow::Result;
    use std::path::Path;

    fn customers() -> Result<DuckDbWarehouse> {
        let warehouse = DuckDbWarehouse::in_memory()?;
        warehouse.execute_batch(
            "CREATE TABLE customers (id INTEGER, email VARCHAR, country VARCHAR, size VARCHAR);
             INSERT INTO customers VALUES
               (1, 'ann@shop.com', 'BE', '1.5'),
               (2, 'bob@shop',     'BE', '2.5'),
               (3, NULL,           'NL', 'N/A'),
               (4, 'eve@shop.com', 'NL', '4.0');",
        )?;
        Ok(warehouse)
    }

    fn resolve(yaml: &str) -> Result<Resolution> {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        Ok(ScanResolver::new(Path::new("scan.yml")).resolve(&raw))
    }

    fn measured(result: &ScanResult, metric: &str, column: Option<&str>) -> MetricValue {
        result
            .measurements
            .iter()
            .find(|m| m.metric == metric && m.column.as_deref() == column)
            .map(|m| m.value.clone())
            .unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_scan() -> Result<()> {
        let resolution = resolve(
            r#"
table_name: customers
metrics: [row_count]
tests:
  - row_count == 4
columns:
  email:
    valid_format: email
    metrics: [invalid_count]
    tests:
      - invalid_count == 0
      - missing_percentage < 50
  size:
    missing_values: ['N/A']
    valid_format: number_decimal_point
    metrics: [avg, valid_count]
sql_metrics:
  - sql: SELECT COUNT(DISTINCT country) AS countries FROM customers
    tests:
      - countries == 2
"#,
        )?;
        let warehouse = customers()?;
        let result = run_scan(&warehouse, &resolution, &ScanOptions::default()).await?;

        assert_eq!(measured(&result, "row_count", None), MetricValue::Integer(4));
        assert_eq!(measured(&result, "missing_count", Some("email")), MetricValue::Integer(1));
        assert_eq!(measured(&result, "valid_count", Some("email")), MetricValue::Integer(2));
        assert_eq!(measured(&result, "invalid_count", Some("email")), MetricValue::Integer(1));
        assert_eq!(measured(&result, "missing_count", Some("size")), MetricValue::Integer(1));
        let avg = measured(&result, "avg", Some("size")).as_f64().unwrap();
        assert!((avg - 8.0 / 3.0).abs() < 1e-9);
        assert_eq!(measured(&result, "countries", None), MetricValue::Integer(2));

        let outcomes: Vec<(String, bool)> = result
            .test_results
            .iter()
            .map(|r| (r.test.expression.clone(), r.passed))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("row_count == 4".to_string(), true),
                ("invalid_count == 0".to_string(), false),
                ("missing_percentage < 50".to_string(), true),
                ("countries == 2".to_string(), true),
            ]
        );
        assert!(result.has_failures());

        let json = result.to_json();
        assert_eq!(json["table"], "customers");
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["columns"][1]["name"], "email");
        Ok(())
    }

    #[tokio::test]
    async fn test_filter_restricts_rows() -> Result<()> {
        let resolution = resolve(
            "table_name: customers\nmetrics: [row_count]\nfilter: \"country = '{{ country }}'\"\n",
        )?;
        let warehouse = customers()?;
        let options = ScanOptions {
            variables: json!({ "country": "NL" }),
            skip_sql_metrics: true,
        };
        let result = run_scan(&warehouse, &resolution, &options).await?;
        assert_eq!(measured(&result, "row_count", None), MetricValue::Integer(2));
        assert!(!result.has_failures());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_specification_is_refused() -> Result<()> {
        let resolution = resolve("metrics: [row_count]\n")?;
        let warehouse = customers()?;
        let result = run_scan(&warehouse, &resolution, &ScanOptions::default()).await;
        assert!(matches!(
            result,
            Err(TallyError::Domain(DomainError::InvalidSpecification(_)))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_table() -> Result<()> {
        let resolution = resolve("table_name: nope\nmetrics: [row_count]\n")?;
        let warehouse = customers()?;
        let result = run_scan(&warehouse, &resolution, &ScanOptions::default()).await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_skip_sql_metrics() -> Result<()> {
        let resolution = resolve(
            "table_name: customers\nsql_metrics:\n  - sql: SELECT 1 AS one\n    tests: [one == 1]\n",
        )?;
        let warehouse = customers()?;
        let options = ScanOptions {
            skip_sql_metrics: true,
            ..ScanOptions::default()
        };
        let result = run_scan(&warehouse, &resolution, &options).await?;
        assert!(result.test_results.is_empty());
        assert_eq!(result.measurements.len(), 1);
        Ok(())
    }
}
