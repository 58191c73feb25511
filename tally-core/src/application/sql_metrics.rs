// tally-core/src/application/sql_metrics.rs

// User SQL metrics run after the aggregation query, one statement each, in
// declaration order (table-level first, then per column).

use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use crate::application::engine;
use crate::application::evaluator::{self, Scope};
use crate::domain::error::DomainError;
use crate::domain::scan::measurement::{Measurement, MetricValue};
use crate::domain::scan::specification::{ScanSpecification, SqlMetricSpec, SqlMetricType};
use crate::domain::scan::test_result::TestResult;
use crate::error::TallyError;
use crate::ports::warehouse::{QueryResult, Warehouse};

#[derive(Debug, Default)]
pub struct SqlMetricOutcome {
    pub measurements: Vec<Measurement>,
    pub test_results: Vec<TestResult>,
}

pub struct SqlMetricRunner<'a> {
    warehouse: &'a dyn Warehouse,
}

impl<'a> SqlMetricRunner<'a> {
    pub fn new(warehouse: &'a dyn Warehouse) -> Self {
        Self { warehouse }
    }

    #[instrument(skip_all, fields(table = %spec.table_name))]
    pub async fn run(&self, spec: &ScanSpecification) -> Result<SqlMetricOutcome, TallyError> {
        let metrics: Vec<&SqlMetricSpec> = spec
            .sql_metrics
            .iter()
            .chain(spec.columns.values().flat_map(|c| c.sql_metrics.iter()))
            .collect();

        let mut outcome = SqlMetricOutcome::default();
        if metrics.is_empty() {
            return Ok(outcome);
        }
        info!("📐 Running {} SQL metric(s)", metrics.len());

        for metric in metrics {
            let result = engine::fetch_all(self.warehouse, &metric.sql).await?;
            match metric.kind {
                SqlMetricType::Numeric => numeric(metric, &result, &mut outcome)?,
                SqlMetricType::NumericGroups => numeric_groups(metric, &result, &mut outcome)?,
                SqlMetricType::FailedRows => failed_rows(metric, &result, &mut outcome)?,
            }
        }
        Ok(outcome)
    }
}

/// First row; one measurement per returned column.
fn numeric(
    metric: &SqlMetricSpec,
    result: &QueryResult,
    outcome: &mut SqlMetricOutcome,
) -> Result<(), TallyError> {
    let row = result.first().ok_or_else(|| DomainError::SqlMetricResult {
        metric: metric.title.clone(),
        reason: "query returned no row".to_string(),
    })?;
    let names = metric_names(metric, &result.columns)?;

    let mut scope = Scope::new();
    for (name, value) in names.iter().zip(row) {
        let measurement = Measurement::new(name, metric.column.as_deref(), value.clone());
        debug!("SQL metric measurement: {}", measurement);
        outcome.measurements.push(measurement);
        scope.insert(name.clone(), value.clone());
    }

    outcome
        .test_results
        .extend(metric.tests.iter().map(|t| evaluator::evaluate_test(t, &scope)));
    Ok(())
}

/// Every row is a group: `group_fields` identify it, the other columns are metrics.
fn numeric_groups(
    metric: &SqlMetricSpec,
    result: &QueryResult,
    outcome: &mut SqlMetricOutcome,
) -> Result<(), TallyError> {
    let group_fields = metric.group_fields.clone().unwrap_or_default();
    for field in &group_fields {
        if !result.columns.iter().any(|c| c.eq_ignore_ascii_case(field)) {
            return Err(DomainError::SqlMetricResult {
                metric: metric.title.clone(),
                reason: format!("group field '{}' is not a result column", field),
            }
            .into());
        }
    }

    let is_group_field =
        |column: &str| group_fields.iter().any(|f| f.eq_ignore_ascii_case(column));
    let value_columns: Vec<String> = result
        .columns
        .iter()
        .filter(|c| !is_group_field(c.as_str()))
        .cloned()
        .collect();
    let names = metric_names(metric, &value_columns)?;

    for row in &result.rows {
        let mut group_values = BTreeMap::new();
        let mut values = Vec::with_capacity(names.len());
        for (column, value) in result.columns.iter().zip(row) {
            if is_group_field(column.as_str()) {
                group_values.insert(column.clone(), value.clone());
            } else {
                values.push(value.clone());
            }
        }
        let scope: Scope = names.iter().cloned().zip(values).collect();
        debug!(metric = %metric.title, ?group_values, ?scope, "SQL metric group");

        outcome.test_results.extend(metric.tests.iter().map(|t| {
            evaluator::evaluate_test(t, &scope).with_group_values(group_values.clone())
        }));
    }
    Ok(())
}

/// The row count becomes the `<name>` metric; its test expects zero.
fn failed_rows(
    metric: &SqlMetricSpec,
    result: &QueryResult,
    outcome: &mut SqlMetricOutcome,
) -> Result<(), TallyError> {
    let name = metric.name.clone().ok_or_else(|| DomainError::SqlMetricResult {
        metric: metric.title.clone(),
        reason: "failed_rows metric has no name".to_string(),
    })?;
    let failed = i64::try_from(result.row_count()).unwrap_or(i64::MAX);

    if failed > 0 {
        let limit = metric
            .failed_limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(result.row_count());
        info!("🚫 {}: {} failed row(s)", metric.title, failed);
        for row in result.rows.iter().take(limit) {
            let rendered: Vec<String> = row.iter().map(MetricValue::to_string).collect();
            debug!("  {}", rendered.join(" | "));
        }
    }

    let value = MetricValue::Integer(failed);
    outcome.measurements.push(Measurement::new(
        &name,
        metric.column.as_deref(),
        value.clone(),
    ));

    let scope = Scope::from([(name, value)]);
    outcome
        .test_results
        .extend(metric.tests.iter().map(|t| evaluator::evaluate_test(t, &scope)));
    Ok(())
}

/// Declared `metric_names` (positional) or the result column names.
fn metric_names(metric: &SqlMetricSpec, columns: &[String]) -> Result<Vec<String>, DomainError> {
    match &metric.metric_names {
        Some(names) if names.len() != columns.len() => Err(DomainError::SqlMetricResult {
            metric: metric.title.clone(),
            reason: format!(
                "{} metric_names declared but the query returned {} value column(s)",
                names.len(),
                columns.len()
            ),
        }),
        Some(names) => Ok(names.clone()),
        None => Ok(columns.to_vec()),
    }
}
