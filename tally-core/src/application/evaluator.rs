// tally-core/src/application/evaluator.rs

use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

use crate::domain::expression::{self, ExpressionError};
use crate::domain::scan::measurement::{Measurement, MetricValue};
use crate::domain::scan::specification::{ScanSpecification, Test};
use crate::domain::scan::test_result::TestResult;

/// Name → value map a test expression is evaluated against.
pub type Scope = BTreeMap<String, MetricValue>;

/// Table-scope measurements only.
pub fn table_scope(measurements: &[Measurement]) -> Scope {
    measurements
        .iter()
        .filter(|m| m.is_table_scope())
        .map(|m| (m.metric.clone(), m.value.clone()))
        .collect()
}

/// Table-scope measurements overlaid with the column's own; the column wins.
pub fn column_scope(measurements: &[Measurement], column: &str) -> Scope {
    let mut scope = table_scope(measurements);
    scope.extend(
        measurements
            .iter()
            .filter(|m| m.is_for_column(column))
            .map(|m| (m.metric.clone(), m.value.clone())),
    );
    scope
}

/// Evaluates one test. Failures of the expression itself end up on the result.
pub fn evaluate_test(test: &Test, scope: &Scope) -> TestResult {
    let values: Scope = test
        .metrics
        .iter()
        .filter_map(|name| scope.get(name).map(|v| (name.clone(), v.clone())))
        .collect();

    let outcome = expression::parse(&test.expression)
        .and_then(|expr| expression::evaluate(&expr, &values));

    let result = match outcome {
        Ok(passed) => TestResult::outcome(test, passed, values),
        Err(e) => {
            warn!(test = %test.title, error = %e, "Test could not be evaluated");
            TestResult::errored(test, values, describe(&e))
        }
    };
    debug!("{}", result);
    result
}

/// Table tests first, then column tests in column name order.
#[instrument(skip_all, fields(table = %spec.table_name))]
pub fn evaluate_tests(spec: &ScanSpecification, measurements: &[Measurement]) -> Vec<TestResult> {
    let mut results = Vec::new();

    if !spec.tests.is_empty() {
        let scope = table_scope(measurements);
        results.extend(spec.tests.iter().map(|t| evaluate_test(t, &scope)));
    }

    for (name, column) in &spec.columns {
        if column.tests.is_empty() {
            continue;
        }
        let scope = column_scope(measurements, name);
        results.extend(column.tests.iter().map(|t| evaluate_test(t, &scope)));
    }

    results
}

fn describe(error: &ExpressionError) -> String {
    match error {
        ExpressionError::UnknownVariable(name) => {
            format!("{} (metric '{}' was not measured)", error, name)
        }
        _ => error.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::scan::specification::ColumnSpec;

    fn test(expression: &str, column: Option<&str>) -> Test {
        Test {
            id: expression.into(),
            title: expression.into(),
            name: None,
            expression: expression.into(),
            metrics: expression::referenced_variables(expression).unwrap_or_default(),
            column: column.map(str::to_string),
        }
    }

    fn measurements() -> Vec<Measurement> {
        vec![
            Measurement::new("row_count", None, MetricValue::Integer(10)),
            Measurement::new("missing_count", Some("email"), MetricValue::Integer(2)),
            Measurement::new("invalid_count", Some("email"), MetricValue::Integer(1)),
            Measurement::new("missing_percentage", Some("email"), MetricValue::Decimal(20.0)),
            Measurement::new("missing_count", Some("name"), MetricValue::Integer(0)),
        ]
    }

    #[test]
    fn test_column_scope_shadows_table_values() {
        let mut ms = measurements();
        ms.push(Measurement::new("row_count", Some("email"), MetricValue::Integer(3)));
        let scope = column_scope(&ms, "EMAIL");
        assert_eq!(scope["row_count"], MetricValue::Integer(3));
        assert_eq!(scope["missing_count"], MetricValue::Integer(2));
        assert!(!scope.contains_key("name"));
    }

    #[test]
    fn test_projects_only_referenced_values() {
        let scope = column_scope(&measurements(), "email");
        let result = evaluate_test(&test("invalid_count == 0", Some("email")), &scope);
        assert!(!result.passed);
        assert!(result.error.is_none());
        assert_eq!(result.values.len(), 1);
        assert_eq!(result.values["invalid_count"], MetricValue::Integer(1));
    }

    #[test]
    fn test_table_values_visible_from_column_tests() {
        let scope = column_scope(&measurements(), "email");
        let result = evaluate_test(
            &test("missing_count < row_count and missing_percentage <= 20", Some("email")),
            &scope,
        );
        assert!(result.passed);
        assert_eq!(result.values.len(), 3);
    }

    #[test]
    fn test_errors_are_recorded_per_test() {
        let scope = column_scope(&measurements(), "email");

        let unknown = evaluate_test(&test("valid_count > 0", Some("email")), &scope);
        assert!(unknown.is_failure());
        assert!(unknown.error.unwrap().contains("valid_count"));

        let malformed = evaluate_test(&test("missing_count >", Some("email")), &scope);
        assert!(malformed.error.unwrap().starts_with("Syntax error"));

        let mut undefined = scope.clone();
        undefined.insert("missing_percentage".into(), MetricValue::Undefined);
        let result = evaluate_test(&test("missing_percentage < 5", Some("email")), &undefined);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_evaluate_tests_covers_table_and_columns() {
        let mut spec = ScanSpecification {
            table_name: "customers".into(),
            tests: vec![test("row_count > 0", None)],
            ..Default::default()
        };
        for (name, expr) in [("email", "missing_count == 2"), ("name", "missing_count == 0")] {
            spec.columns.insert(
                name.into(),
                ColumnSpec {
                    tests: vec![test(expr, Some(name))],
                    ..Default::default()
                },
            );
        }

        let results = evaluate_tests(&spec, &measurements());
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.passed && r.error.is_none()));
        assert_eq!(results[0].test.expression, "row_count > 0");
        assert_eq!(results[1].test.column.as_deref(), Some("email"));
    }
}
