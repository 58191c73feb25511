// tally-core/src/domain/scan/specification.rs

// The resolved, immutable description of one scan. Built once by the resolver,
// then only read by the query builder, the reducer and the evaluator.

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::scan::filter::FilterTemplate;
use crate::domain::scan::formats;

// =============================================================================
//  1. LITERALS & POLICIES
// =============================================================================

/// Literal from a `missing_values` / `valid_values` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigLiteral {
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl ConfigLiteral {
    pub fn from_yaml(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Boolean(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Decimal)),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_yaml(&self) -> Value {
        match self {
            Self::Boolean(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::Decimal(d) => Value::from(*d),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ConfigLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Which values count as missing beyond SQL `NULL`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MissingPolicy {
    pub values: Option<Vec<ConfigLiteral>>,
    pub format: Option<String>,
    pub regex: Option<String>,
}

/// Which non-missing values count as valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidityPolicy {
    pub format: Option<String>,
    pub regex: Option<String>,
    pub values: Option<Vec<ConfigLiteral>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<i64>,
    pub max_length: Option<i64>,
}

impl ValidityPolicy {
    pub fn is_number_format(&self) -> bool {
        self.format.as_deref().is_some_and(formats::is_number_format)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SamplesPolicy {
    pub table_limit: Option<i64>,
    pub table_tablesample: Option<String>,
    pub failed_limit: Option<i64>,
    pub failed_tablesample: Option<String>,
    pub passed_limit: Option<i64>,
    pub passed_tablesample: Option<String>,
}

// =============================================================================
//  2. TESTS & SQL METRICS
// =============================================================================

/// A boolean assertion over named measurement values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Test {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub expression: String,
    /// Identifiers referenced by the expression, in first-seen order.
    pub metrics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlMetricType {
    Numeric,
    NumericGroups,
    FailedRows,
}

impl SqlMetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::NumericGroups => "numeric_groups",
            Self::FailedRows => "failed_rows",
        }
    }
}

impl std::str::FromStr for SqlMetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "numeric" => Ok(Self::Numeric),
            "numeric_groups" => Ok(Self::NumericGroups),
            "failed_rows" => Ok(Self::FailedRows),
            _ => Err(format!("Unknown sql_metric type {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlMetricSpec {
    #[serde(rename = "type")]
    pub kind: SqlMetricType,
    pub name: Option<String>,
    pub title: String,
    pub sql: String,
    pub index: usize,
    pub column: Option<String>,
    pub metric_names: Option<Vec<String>>,
    pub group_fields: Option<Vec<String>>,
    pub failed_limit: Option<i64>,
    pub tests: Vec<Test>,
}

// =============================================================================
//  3. COLUMNS & SCAN
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnSpec {
    pub metrics: BTreeSet<String>,
    pub missing: Option<MissingPolicy>,
    pub validity: Option<ValidityPolicy>,
    pub sql_metrics: Vec<SqlMetricSpec>,
    pub tests: Vec<Test>,
    pub samples: Option<SamplesPolicy>,
}

impl ColumnSpec {
    pub fn is_metric_enabled(&self, metric: &str) -> bool {
        self.metrics.contains(metric)
    }

    pub fn validity_format(&self) -> Option<&str> {
        self.validity.as_ref().and_then(|v| v.format.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSpecification {
    pub table_name: String,
    pub metrics: BTreeSet<String>,
    /// Keyed by lower-cased column name.
    pub columns: BTreeMap<String, ColumnSpec>,
    pub sql_metrics: Vec<SqlMetricSpec>,
    pub tests: Vec<Test>,
    pub samples: Option<SamplesPolicy>,
    pub sample_percentage: Option<f64>,
    pub sample_method: String,
    #[serde(skip)]
    pub filter: Option<FilterTemplate>,
}

pub const DEFAULT_SAMPLE_METHOD: &str = "SYSTEM";

impl Default for ScanSpecification {
    fn default() -> Self {
        Self {
            table_name: String::new(),
            metrics: BTreeSet::new(),
            columns: BTreeMap::new(),
            sql_metrics: Vec::new(),
            tests: Vec::new(),
            samples: None,
            sample_percentage: None,
            sample_method: DEFAULT_SAMPLE_METHOD.to_string(),
            filter: None,
        }
    }
}

impl ScanSpecification {
    /// Case-insensitive lookup; warehouses disagree on identifier casing.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.get(&name.to_lowercase())
    }

    /// Metrics computed for a column: table-level metrics apply to every
    /// column, column-level metrics add to them.
    pub fn column_metrics(&self, name: &str) -> BTreeSet<String> {
        let mut metrics = self.metrics.clone();
        if let Some(column) = self.column(name) {
            metrics.extend(column.metrics.iter().cloned());
        }
        metrics
    }

    pub fn table_limit(&self) -> Option<i64> {
        self.samples.as_ref().and_then(|s| s.table_limit)
    }

    /// Re-emits the metric-bearing part of the configuration in its raw shape.
    ///
    /// Metric sets are written fully expanded, so resolving the output again
    /// yields the same sets.
    pub fn to_config(&self) -> Value {
        let mut root = Mapping::new();
        root.insert("table_name".into(), Value::String(self.table_name.clone()));
        root.insert("metrics".into(), metric_list(&self.metrics));

        if !self.columns.is_empty() {
            let mut columns = Mapping::new();
            for (name, column) in &self.columns {
                columns.insert(Value::String(name.clone()), column_config(column));
            }
            root.insert("columns".into(), Value::Mapping(columns));
        }

        if !self.tests.is_empty() {
            root.insert("tests".into(), tests_value(&self.tests));
        }
        if let Some(percentage) = self.sample_percentage {
            root.insert("sample_percentage".into(), Value::from(percentage));
            root.insert(
                "sample_method".into(),
                Value::String(self.sample_method.clone()),
            );
        }
        if let Some(filter) = &self.filter {
            root.insert("filter".into(), Value::String(filter.source().to_string()));
        }
        if let Some(limit) = self.table_limit() {
            let mut samples = Mapping::new();
            samples.insert("table_limit".into(), Value::from(limit));
            root.insert("samples".into(), Value::Mapping(samples));
        }
        Value::Mapping(root)
    }
}

fn metric_list(metrics: &BTreeSet<String>) -> Value {
    Value::Sequence(metrics.iter().cloned().map(Value::String).collect())
}

/// Named tests come back in map form, anonymous ones as a list.
fn tests_value(tests: &[Test]) -> Value {
    if tests.iter().all(|t| t.name.is_some()) {
        let mut named = Mapping::new();
        for t in tests {
            if let Some(name) = &t.name {
                named.insert(Value::String(name.clone()), Value::String(t.expression.clone()));
            }
        }
        return Value::Mapping(named);
    }
    Value::Sequence(
        tests
            .iter()
            .map(|t| Value::String(t.expression.clone()))
            .collect(),
    )
}

fn literal_list(values: &[ConfigLiteral]) -> Value {
    Value::Sequence(values.iter().map(ConfigLiteral::to_yaml).collect())
}

fn column_config(column: &ColumnSpec) -> Value {
    let mut map = Mapping::new();
    map.insert("metrics".into(), metric_list(&column.metrics));

    if let Some(missing) = &column.missing {
        if let Some(values) = &missing.values {
            map.insert("missing_values".into(), literal_list(values));
        }
        if let Some(format) = &missing.format {
            map.insert("missing_format".into(), Value::String(format.clone()));
        }
        if let Some(regex) = &missing.regex {
            map.insert("missing_regex".into(), Value::String(regex.clone()));
        }
    }

    if let Some(validity) = &column.validity {
        if let Some(format) = &validity.format {
            map.insert("valid_format".into(), Value::String(format.clone()));
        }
        if let Some(regex) = &validity.regex {
            map.insert("valid_regex".into(), Value::String(regex.clone()));
        }
        if let Some(values) = &validity.values {
            map.insert("valid_values".into(), literal_list(values));
        }
        if let Some(min) = validity.min {
            map.insert("valid_min".into(), Value::from(min));
        }
        if let Some(max) = validity.max {
            map.insert("valid_max".into(), Value::from(max));
        }
        if let Some(min_length) = validity.min_length {
            map.insert("valid_min_length".into(), Value::from(min_length));
        }
        if let Some(max_length) = validity.max_length {
            map.insert("valid_max_length".into(), Value::from(max_length));
        }
    }

    if !column.tests.is_empty() {
        map.insert("tests".into(), tests_value(&column.tests));
    }
    Value::Mapping(map)
}
