// tally-core/src/domain/scan/test_result.rs

use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::scan::measurement::MetricValue;
use crate::domain::scan::specification::Test;

#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub test: Test,
    pub passed: bool,
    /// The projected values the expression was evaluated against.
    pub values: BTreeMap<String, MetricValue>,
    pub group_values: Option<BTreeMap<String, MetricValue>>,
    pub error: Option<String>,
}

impl TestResult {
    pub fn passed(test: &Test, values: BTreeMap<String, MetricValue>) -> Self {
        Self::outcome(test, true, values)
    }

    pub fn outcome(test: &Test, passed: bool, values: BTreeMap<String, MetricValue>) -> Self {
        Self {
            test: test.clone(),
            passed,
            values,
            group_values: None,
            error: None,
        }
    }

    pub fn errored(test: &Test, values: BTreeMap<String, MetricValue>, error: String) -> Self {
        Self {
            test: test.clone(),
            passed: false,
            values,
            group_values: None,
            error: Some(error),
        }
    }

    pub fn with_group_values(mut self, group_values: BTreeMap<String, MetricValue>) -> Self {
        self.group_values = Some(group_values);
        self
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some() || !self.passed
    }

    /// Reporting shape: `passed` + `values` on success or failure, `error` otherwise.
    pub fn to_json(&self) -> JsonValue {
        if self.test.expression.is_empty() {
            return json!({ "error": "Invalid test result" });
        }

        let mut out = Map::new();
        out.insert("id".into(), json!(self.test.id));
        out.insert("title".into(), json!(self.test.title));
        // kept for consumers reading the older field name
        out.insert("description".into(), json!(self.test.title));
        out.insert("expression".into(), json!(self.test.expression));

        if let Some(column) = &self.test.column {
            out.insert("columnName".into(), json!(column));
        }

        match &self.error {
            Some(error) => {
                out.insert("error".into(), json!(error));
            }
            None => {
                out.insert("passed".into(), json!(self.passed));
                out.insert("values".into(), json!(self.values));
            }
        }

        if let Some(groups) = &self.group_values {
            out.insert("groupValues".into(), json!(groups));
        }

        JsonValue::Object(out)
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(error) = &self.error {
            return write!(f, "Test {} errored: {}", self.test.title, error);
        }
        write!(
            f,
            "Test {} {}",
            self.test.title,
            if self.passed { "passed" } else { "failed" }
        )?;
        if let Some(groups) = &self.group_values {
            write!(f, " with group values {}", render_values(groups))?;
        }
        write!(f, " with measurements {}", render_values(&self.values))
    }
}

fn render_values(values: &BTreeMap<String, MetricValue>) -> String {
    let parts: Vec<String> = values.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", parts.join(", "))
}
