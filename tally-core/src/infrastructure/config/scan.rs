// tally-core/src/infrastructure/config/scan.rs

// Scan file resolution: raw YAML in, immutable `ScanSpecification` plus leveled
// diagnostics out. Resolution never fails; an `error` diagnostic only blocks
// query construction further down.

use regex::Regex;
use serde_json::Value as JsonValue;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, instrument};

use crate::domain::expression;
use crate::domain::scan::diagnostics::{ConfigPath, Diagnostics};
use crate::domain::scan::filter::FilterTemplate;
use crate::domain::scan::formats;
use crate::domain::scan::metric::{self, ROW_COUNT};
use crate::domain::scan::specification::{
    ColumnSpec, ConfigLiteral, DEFAULT_SAMPLE_METHOD, MissingPolicy, SamplesPolicy, ScanSpecification, SqlMetricSpec,
    SqlMetricType, Test, ValidityPolicy,
};
use crate::infrastructure::error::InfrastructureError;

// =============================================================================
//  1. KEYS
// =============================================================================

const KEY_TABLE_NAME: &str = "table_name";
const KEY_METRICS: &str = "metrics";
const KEY_METRIC_GROUPS: &str = "metric_groups";
const KEY_SQL_METRICS: &str = "sql_metrics";
const KEY_TESTS: &str = "tests";
const KEY_COLUMNS: &str = "columns";
const KEY_MINS_MAXS_LIMIT: &str = "mins_maxs_limit";
const KEY_FREQUENT_VALUES_LIMIT: &str = "frequent_values_limit";
const KEY_SAMPLE_PERCENTAGE: &str = "sample_percentage";
const KEY_SAMPLE_METHOD: &str = "sample_method";
const KEY_FILTER: &str = "filter";
const KEY_SAMPLES: &str = "samples";

const SCAN_KEYS: &[&str] = &[
    KEY_TABLE_NAME,
    KEY_METRICS,
    KEY_METRIC_GROUPS,
    KEY_SQL_METRICS,
    KEY_TESTS,
    KEY_COLUMNS,
    KEY_MINS_MAXS_LIMIT,
    KEY_FREQUENT_VALUES_LIMIT,
    KEY_SAMPLE_PERCENTAGE,
    KEY_SAMPLE_METHOD,
    KEY_FILTER,
    KEY_SAMPLES,
];

const COLUMN_KEY_MISSING_VALUES: &str = "missing_values";
const COLUMN_KEY_MISSING_FORMAT: &str = "missing_format";
const COLUMN_KEY_MISSING_REGEX: &str = "missing_regex";
const COLUMN_KEY_VALID_FORMAT: &str = "valid_format";
const COLUMN_KEY_VALID_REGEX: &str = "valid_regex";
const COLUMN_KEY_VALID_VALUES: &str = "valid_values";
const COLUMN_KEY_VALID_MIN: &str = "valid_min";
const COLUMN_KEY_VALID_MAX: &str = "valid_max";
const COLUMN_KEY_VALID_MIN_LENGTH: &str = "valid_min_length";
const COLUMN_KEY_VALID_MAX_LENGTH: &str = "valid_max_length";

const COLUMN_MISSING_KEYS: &[&str] = &[
    COLUMN_KEY_MISSING_VALUES,
    COLUMN_KEY_MISSING_FORMAT,
    COLUMN_KEY_MISSING_REGEX,
];

const COLUMN_VALID_KEYS: &[&str] = &[
    COLUMN_KEY_VALID_FORMAT,
    COLUMN_KEY_VALID_REGEX,
    COLUMN_KEY_VALID_VALUES,
    COLUMN_KEY_VALID_MIN,
    COLUMN_KEY_VALID_MAX,
    COLUMN_KEY_VALID_MIN_LENGTH,
    COLUMN_KEY_VALID_MAX_LENGTH,
];

const COLUMN_OTHER_KEYS: &[&str] = &[
    KEY_METRICS,
    KEY_METRIC_GROUPS,
    KEY_SQL_METRICS,
    KEY_TESTS,
    KEY_SAMPLES,
];

const SAMPLES_KEY_TABLE_LIMIT: &str = "table_limit";
const SAMPLES_KEY_TABLE_TABLESAMPLE: &str = "table_tablesample";
const SAMPLES_KEY_FAILED_LIMIT: &str = "failed_limit";
const SAMPLES_KEY_FAILED_TABLESAMPLE: &str = "failed_tablesample";
const SAMPLES_KEY_PASSED_LIMIT: &str = "passed_limit";
const SAMPLES_KEY_PASSED_TABLESAMPLE: &str = "passed_tablesample";

const SAMPLES_KEYS: &[&str] = &[
    SAMPLES_KEY_TABLE_LIMIT,
    SAMPLES_KEY_TABLE_TABLESAMPLE,
    SAMPLES_KEY_FAILED_LIMIT,
    SAMPLES_KEY_FAILED_TABLESAMPLE,
    SAMPLES_KEY_PASSED_LIMIT,
    SAMPLES_KEY_PASSED_TABLESAMPLE,
];

const SQL_METRIC_KEY_NAME: &str = "name";
const SQL_METRIC_KEY_TITLE: &str = "title";
const SQL_METRIC_KEY_TYPE: &str = "type";
const SQL_METRIC_KEY_SQL: &str = "sql";
const SQL_METRIC_KEY_SQL_FILE: &str = "sql_file";
const SQL_METRIC_KEY_METRIC_NAMES: &str = "metric_names";
const SQL_METRIC_KEY_GROUP_FIELDS: &str = "group_fields";

const SQL_METRIC_KEYS: &[&str] = &[
    SQL_METRIC_KEY_NAME,
    SQL_METRIC_KEY_TITLE,
    SQL_METRIC_KEY_TYPE,
    SQL_METRIC_KEY_SQL,
    SQL_METRIC_KEY_SQL_FILE,
    SQL_METRIC_KEY_METRIC_NAMES,
    KEY_TESTS,
    SQL_METRIC_KEY_GROUP_FIELDS,
    SAMPLES_KEY_FAILED_LIMIT,
];

fn re_identifier() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .unwrap_or_else(|_| Regex::new("$^").unwrap_or_else(|_| unreachable!()))
    })
}

// =============================================================================
//  2. RESOLVER
// =============================================================================

/// Outcome of resolving one scan file.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub spec: ScanSpecification,
    pub diagnostics: Diagnostics,
}

impl Resolution {
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.has_errors()
    }
}

/// Resolves scan configurations located at `scan_path`. `sql_file`
/// references are read relative to the scan file's directory.
pub struct ScanResolver {
    source: String,
    base_dir: PathBuf,
}

/// Where a test was declared; drives its id and title.
#[derive(Debug, Clone, Copy, Default)]
struct TestScope<'a> {
    column: Option<&'a str>,
    sql_metric_name: Option<&'a str>,
    sql_metric_index: Option<usize>,
    sql_metric_title: Option<&'a str>,
}

impl TestScope<'_> {
    fn test(&self, name: Option<String>, expression: String, metrics: Vec<String>) -> Test {
        let mut id: BTreeMap<&str, JsonValue> = BTreeMap::new();
        id.insert("expression", JsonValue::from(expression.as_str()));
        if let Some(column) = self.column {
            id.insert("column", JsonValue::from(column));
        }
        if let Some(sql_metric_name) = self.sql_metric_name {
            id.insert("sql_metric_name", JsonValue::from(sql_metric_name));
        }
        if let Some(index) = self.sql_metric_index {
            id.insert("sql_metric_index", JsonValue::from(index));
        }
        let id = JsonValue::Object(id.into_iter().map(|(k, v)| (k.to_string(), v)).collect());

        let label = name.as_deref().unwrap_or(&expression);
        let title = match (self.sql_metric_title, self.column) {
            (Some(prefix), _) => format!("{}.test({})", prefix, label),
            (None, Some(column)) => format!("{}.test({})", column, label),
            (None, None) => format!("test({})", label),
        };

        Test {
            id: id.to_string(),
            title,
            name,
            expression,
            metrics,
            column: self.column.map(str::to_string),
        }
    }
}

impl ScanResolver {
    pub fn new(scan_path: &Path) -> Self {
        Self {
            source: scan_path.display().to_string(),
            base_dir: scan_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    #[instrument(skip(self, raw), fields(source = %self.source))]
    pub fn resolve(&self, raw: &Value) -> Resolution {
        let mut diagnostics = Diagnostics::new();
        let root = ConfigPath::root(self.source.clone());
        let mut spec = ScanSpecification::default();

        let Some(map) = raw.as_mapping() else {
            diagnostics.error(
                &root,
                format!(
                    "Scan configuration must be an object, not a {}",
                    type_name(raw)
                ),
            );
            return Resolution { spec, diagnostics };
        };
        let diags = &mut diagnostics;

        match get(map, KEY_TABLE_NAME) {
            None => diags.error(
                &root.key(KEY_TABLE_NAME),
                "Missing required key 'table_name'",
            ),
            Some(_) => match get_str(map, KEY_TABLE_NAME, &root, diags) {
                Some(name) if name.trim().is_empty() => {
                    diags.error(&root.key(KEY_TABLE_NAME), "table_name must not be empty")
                }
                Some(name) => spec.table_name = name,
                None => {}
            },
        }

        spec.metrics = resolve_metrics(map, root.clone(), diags);
        spec.sql_metrics = self.resolve_sql_metrics(map, root.clone(), None, diags);
        spec.tests = resolve_tests(map, root.clone(), &TestScope::default(), diags);
        spec.columns = self.resolve_columns(map, root.clone(), &mut spec.metrics, diags);

        // both limits only shape grouped metrics
        for key in [KEY_MINS_MAXS_LIMIT, KEY_FREQUENT_VALUES_LIMIT] {
            if get_int(map, key, &root, diags).is_some() {
                diags.info(
                    &root.key(key),
                    format!("{} has no effect: grouped metrics are not computed by the aggregation query", key),
                );
            }
        }
        spec.samples = resolve_samples(map, root.clone(), diags);

        spec.sample_percentage = get_float(map, KEY_SAMPLE_PERCENTAGE, &root, diags);
        if let Some(percentage) = spec.sample_percentage
            && !(0.0..=100.0).contains(&percentage)
        {
            diags.error(
                &root.key(KEY_SAMPLE_PERCENTAGE),
                format!("sample_percentage must be between 0 and 100, got {}", percentage),
            );
        }
        spec.sample_method = get_str(map, KEY_SAMPLE_METHOD, &root, diags)
            .map(|m| m.to_uppercase())
            .unwrap_or_else(|| DEFAULT_SAMPLE_METHOD.to_string());

        if let Some(filter) = get_str(map, KEY_FILTER, &root, diags) {
            match FilterTemplate::compile(&filter) {
                Ok(template) => spec.filter = Some(template),
                Err(e) => diags.error(
                    &root.key(KEY_FILTER),
                    format!("Couldn't parse filter '{}': {}", filter, e),
                ),
            }
        }

        check_invalid_keys(map, SCAN_KEYS, &root, diags);

        debug!(
            table = %spec.table_name,
            columns = spec.columns.len(),
            diagnostics = diagnostics.len(),
            "Scan configuration resolved"
        );
        Resolution { spec, diagnostics }
    }

    // --- COLUMNS ---

    fn resolve_columns(
        &self,
        map: &Mapping,
        path: ConfigPath,
        table_metrics: &mut BTreeSet<String>,
        diags: &mut Diagnostics,
    ) -> BTreeMap<String, ColumnSpec> {
        let mut columns = BTreeMap::new();
        let Some(columns_map) = get_mapping(map, KEY_COLUMNS, &path, diags) else {
            return columns;
        };
        let path = path.key(KEY_COLUMNS);

        for (key, value) in columns_map {
            let Some(column_name) = key.as_str() else {
                diags.error(
                    &path,
                    format!("Column names must be strings, not a {}", type_name(key)),
                );
                continue;
            };
            let column_path = path.key(column_name);
            let Some(column_map) = value.as_mapping() else {
                diags.error(
                    &column_path,
                    format!(
                        "Column {} should be an object, not a {}",
                        column_name,
                        type_name(value)
                    ),
                );
                continue;
            };

            let column =
                self.resolve_column(column_name, column_map, column_path.clone(), table_metrics, diags);
            if columns.insert(column_name.to_lowercase(), column).is_some() {
                diags.warning(
                    &column_path,
                    format!("Column {} is declared twice (names are case-insensitive)", column_name),
                );
            }
        }
        columns
    }

    fn resolve_column(
        &self,
        column_name: &str,
        map: &Mapping,
        path: ConfigPath,
        table_metrics: &mut BTreeSet<String>,
        diags: &mut Diagnostics,
    ) -> ColumnSpec {
        let mut metrics = resolve_metrics(map, path.clone(), diags);

        if metrics.remove(ROW_COUNT) && table_metrics.insert(ROW_COUNT.to_string()) {
            diags.info(
                &path.key(KEY_METRICS),
                format!(
                    "Added metric {} as dependency of column {}",
                    ROW_COUNT, column_name
                ),
            );
        }

        let missing = resolve_missing(map, &path, diags);
        let validity = resolve_validity(map, &path, diags);
        let sql_metrics = self.resolve_sql_metrics(map, path.clone(), Some(column_name), diags);

        let scope = TestScope {
            column: Some(column_name),
            ..TestScope::default()
        };
        let tests = resolve_tests(map, path.clone(), &scope, diags);

        let samples = resolve_samples(map, path.clone(), diags);
        if let Some(samples) = &samples {
            let samples_path = path.key(KEY_SAMPLES);
            if samples.table_limit.is_some() {
                diags.warning(
                    &samples_path.key(SAMPLES_KEY_TABLE_LIMIT),
                    "Invalid column samples key 'table_limit'",
                );
            }
            if samples.table_tablesample.is_some() {
                diags.warning(
                    &samples_path.key(SAMPLES_KEY_TABLE_TABLESAMPLE),
                    "Invalid column samples key 'table_tablesample'",
                );
            }
        }

        let allowed: Vec<&str> = COLUMN_MISSING_KEYS
            .iter()
            .chain(COLUMN_VALID_KEYS)
            .chain(COLUMN_OTHER_KEYS)
            .copied()
            .collect();
        check_invalid_keys(map, &allowed, &path, diags);

        ColumnSpec {
            metrics,
            missing,
            validity,
            sql_metrics,
            tests,
            samples,
        }
    }

    // --- SQL METRICS ---

    fn resolve_sql_metrics(
        &self,
        map: &Mapping,
        path: ConfigPath,
        column: Option<&str>,
        diags: &mut Diagnostics,
    ) -> Vec<SqlMetricSpec> {
        let Some(raw) = get(map, KEY_SQL_METRICS) else {
            return Vec::new();
        };
        let path = path.key(KEY_SQL_METRICS);
        let Some(items) = raw.as_sequence() else {
            diags.error(
                &path,
                format!(
                    "Expected list of SQL metrics, but was {}",
                    type_name(raw)
                ),
            );
            return Vec::new();
        };

        let mut sql_metrics = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let item_path = path.index(index);
            match item.as_mapping() {
                Some(item_map) => {
                    if let Some(sql_metric) =
                        self.resolve_sql_metric(item_map, index, item_path, column, diags)
                    {
                        sql_metrics.push(sql_metric);
                    }
                }
                None => diags.error(
                    &item_path,
                    format!(
                        "SQL metric {} was {}, expected object",
                        index,
                        type_name(item)
                    ),
                ),
            }
        }
        sql_metrics
    }

    fn resolve_sql_metric(
        &self,
        map: &Mapping,
        index: usize,
        path: ConfigPath,
        column: Option<&str>,
        diags: &mut Diagnostics,
    ) -> Option<SqlMetricSpec> {
        check_invalid_keys(map, SQL_METRIC_KEYS, &path, diags);

        let group_fields = get_string_list(map, SQL_METRIC_KEY_GROUP_FIELDS, &path, diags);
        let declared_type =
            get_str(map, SQL_METRIC_KEY_TYPE, &path, diags).unwrap_or_else(|| "numeric".to_string());

        let kind = if group_fields.as_ref().is_some_and(|g| !g.is_empty()) {
            SqlMetricType::NumericGroups
        } else {
            match declared_type.parse::<SqlMetricType>() {
                Ok(kind) => kind,
                Err(message) => {
                    diags.error(&path.key(SQL_METRIC_KEY_TYPE), message);
                    return None;
                }
            }
        };

        let name = get_str(map, SQL_METRIC_KEY_NAME, &path, diags);
        let declared_title = get_str(map, SQL_METRIC_KEY_TITLE, &path, diags);
        let default_title = format!(
            "{}{}",
            column.map(|c| format!("{}.", c)).unwrap_or_default(),
            name.clone()
                .unwrap_or_else(|| format!("sql_metric[{}]", index))
        );
        let title = declared_title.unwrap_or(default_title);

        match kind {
            SqlMetricType::FailedRows => {
                let Some(name) = name else {
                    diags.error(
                        &path.key(SQL_METRIC_KEY_NAME),
                        "Missing required key 'name' for a failed_rows metric",
                    );
                    return None;
                };
                if !re_identifier().is_match(&name) {
                    diags.error(
                        &path.key(SQL_METRIC_KEY_NAME),
                        format!("Invalid metric identifier {}", name),
                    );
                    return None;
                }
                let sql = self.resolve_sql(map, &path, diags)?;

                if get(map, KEY_TESTS).is_some() {
                    diags.warning(
                        &path.key(KEY_TESTS),
                        format!("Tests of failed_rows metric {} are replaced by '{} == 0'", name, name),
                    );
                }

                let scope = TestScope {
                    column,
                    sql_metric_name: Some(&name),
                    sql_metric_index: Some(index),
                    sql_metric_title: Some(&title),
                };
                let test = scope.test(
                    Some(name.clone()),
                    format!("{} == 0", name),
                    vec![name.clone()],
                );
                let failed_limit = get_int(map, SAMPLES_KEY_FAILED_LIMIT, &path, diags);

                Some(SqlMetricSpec {
                    kind,
                    name: Some(name),
                    title,
                    sql,
                    index,
                    column: column.map(str::to_string),
                    metric_names: None,
                    group_fields: None,
                    failed_limit,
                    tests: vec![test],
                })
            }
            SqlMetricType::Numeric | SqlMetricType::NumericGroups => {
                let sql = self.resolve_sql(map, &path, diags)?;
                let metric_names = get_string_list(map, SQL_METRIC_KEY_METRIC_NAMES, &path, diags);

                if kind == SqlMetricType::NumericGroups && group_fields.is_none() {
                    diags.warning(
                        &path.key(SQL_METRIC_KEY_GROUP_FIELDS),
                        "numeric_groups metric without group_fields: every row is its own group",
                    );
                }

                let scope = TestScope {
                    column,
                    sql_metric_name: name.as_deref(),
                    sql_metric_index: Some(index),
                    sql_metric_title: Some(&title),
                };
                let tests = resolve_tests(map, path.clone(), &scope, diags);

                Some(SqlMetricSpec {
                    kind,
                    name,
                    title,
                    sql,
                    index,
                    column: column.map(str::to_string),
                    metric_names,
                    group_fields,
                    failed_limit: get_int(map, SAMPLES_KEY_FAILED_LIMIT, &path, diags),
                    tests,
                })
            }
        }
    }

    /// Inline `sql`, or the content of `sql_file` relative to the scan file.
    fn resolve_sql(&self, map: &Mapping, path: &ConfigPath, diags: &mut Diagnostics) -> Option<String> {
        let inline = get_str(map, SQL_METRIC_KEY_SQL, path, diags);
        let sql_file = get_str(map, SQL_METRIC_KEY_SQL_FILE, path, diags);

        let sql = match (inline, sql_file) {
            (None, None) => {
                diags.error(path, "No sql nor sql_file specified in SQL metric");
                return None;
            }
            (inline, Some(file)) => {
                if inline.is_some() {
                    diags.warning(
                        &path.key(SQL_METRIC_KEY_SQL),
                        "Both sql and sql_file are declared; sql_file is used",
                    );
                }
                let file_path = self.base_dir.join(&file);
                match fs::read_to_string(&file_path) {
                    Ok(content) => content,
                    Err(e) => {
                        diags.error(
                            &path.key(SQL_METRIC_KEY_SQL_FILE),
                            format!("Couldn't read sql_file {}: {}", file_path.display(), e),
                        );
                        return None;
                    }
                }
            }
            (Some(inline), None) => inline,
        };

        let dialect = sqlparser::dialect::GenericDialect {};
        if let Err(e) = sqlparser::parser::Parser::parse_sql(&dialect, &sql) {
            diags.warning(
                &path.key(SQL_METRIC_KEY_SQL),
                format!("SQL does not parse as generic SQL (the warehouse may still accept it): {}", e),
            );
        }
        Some(sql)
    }
}

// =============================================================================
//  3. SCOPE RESOLUTION (metrics, policies, tests, samples)
// =============================================================================

fn resolve_metrics(map: &Mapping, path: ConfigPath, diags: &mut Diagnostics) -> BTreeSet<String> {
    let metrics = get_string_list(map, KEY_METRICS, &path, diags).unwrap_or_default();
    let groups = get_string_list(map, KEY_METRIC_GROUPS, &path, diags).unwrap_or_default();

    let closure = metric::metric_closure(
        metrics.iter().map(String::as_str),
        groups.iter().map(String::as_str),
    );
    for group in &closure.unknown_groups {
        diags.warning(
            &path.key(KEY_METRIC_GROUPS),
            format!("Invalid metric_group {}", group),
        );
    }
    for unknown in &closure.unknown_metrics {
        diags.error(&path.key(KEY_METRICS), format!("Invalid metric {}", unknown));
    }

    let grouped = metric::grouped_metrics(&closure.metrics);
    if !grouped.is_empty() {
        let message = format!(
            "Metrics {} need a grouped query and are not computed",
            grouped.join(", ")
        );
        if grouped.iter().any(|g| metrics.iter().any(|m| m == g)) {
            diags.warning(&path.key(KEY_METRICS), message);
        } else {
            diags.info(&path.key(KEY_METRIC_GROUPS), message);
        }
    }
    closure.metrics
}

fn resolve_missing(map: &Mapping, path: &ConfigPath, diags: &mut Diagnostics) -> Option<MissingPolicy> {
    if !COLUMN_MISSING_KEYS.iter().any(|k| get(map, k).is_some()) {
        return None;
    }

    let format = get_str(map, COLUMN_KEY_MISSING_FORMAT, path, diags);
    if let Some(name) = &format
        && formats::missing_format(name).is_none()
    {
        diags.warning(
            &path.key(COLUMN_KEY_MISSING_FORMAT),
            format!("Invalid missing_format: {}", name),
        );
    }

    let regex = get_str(map, COLUMN_KEY_MISSING_REGEX, path, diags);
    check_regex(regex.as_deref(), &path.key(COLUMN_KEY_MISSING_REGEX), diags);

    Some(MissingPolicy {
        values: get_literal_list(map, COLUMN_KEY_MISSING_VALUES, path, diags),
        format,
        regex,
    })
}

fn resolve_validity(
    map: &Mapping,
    path: &ConfigPath,
    diags: &mut Diagnostics,
) -> Option<ValidityPolicy> {
    if !COLUMN_VALID_KEYS.iter().any(|k| get(map, k).is_some()) {
        return None;
    }

    let format = get_str(map, COLUMN_KEY_VALID_FORMAT, path, diags);
    if let Some(name) = &format
        && formats::validity_format(name).is_none()
    {
        diags.warning(
            &path.key(COLUMN_KEY_VALID_FORMAT),
            format!("Invalid valid_format: {}", name),
        );
    }

    let regex = get_str(map, COLUMN_KEY_VALID_REGEX, path, diags);
    check_regex(regex.as_deref(), &path.key(COLUMN_KEY_VALID_REGEX), diags);

    Some(ValidityPolicy {
        format,
        regex,
        values: get_literal_list(map, COLUMN_KEY_VALID_VALUES, path, diags),
        min: get_float(map, COLUMN_KEY_VALID_MIN, path, diags),
        max: get_float(map, COLUMN_KEY_VALID_MAX, path, diags),
        min_length: get_int(map, COLUMN_KEY_VALID_MIN_LENGTH, path, diags),
        max_length: get_int(map, COLUMN_KEY_VALID_MAX_LENGTH, path, diags),
    })
}

/// Warehouse regex flavours differ; a pattern our engine rejects is suspicious, not fatal.
fn check_regex(pattern: Option<&str>, path: &ConfigPath, diags: &mut Diagnostics) {
    if let Some(pattern) = pattern
        && let Err(e) = Regex::new(pattern)
    {
        diags.warning(path, format!("Regex '{}' does not compile: {}", pattern, e));
    }
}

fn resolve_tests(
    map: &Mapping,
    path: ConfigPath,
    scope: &TestScope<'_>,
    diags: &mut Diagnostics,
) -> Vec<Test> {
    let Some(raw) = get(map, KEY_TESTS) else {
        return Vec::new();
    };
    let path = path.key(KEY_TESTS);
    let mut tests = Vec::new();

    match raw {
        Value::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(expression) => {
                        tests.extend(resolve_test(None, expression, path.index(i), scope, diags))
                    }
                    None => diags.error(
                        &path.index(i),
                        format!("Test must be an expression string, not a {}", type_name(item)),
                    ),
                }
            }
        }
        Value::Mapping(named) => {
            for (key, value) in named {
                let (Some(name), Some(expression)) = (key.as_str(), value.as_str()) else {
                    diags.error(&path, "Named tests must map a string name to an expression string");
                    continue;
                };
                tests.extend(resolve_test(
                    Some(name.to_string()),
                    expression,
                    path.key(name),
                    scope,
                    diags,
                ));
            }
        }
        other => diags.error(
            &path,
            format!("Expected a list or an object of tests, not a {}", type_name(other)),
        ),
    }
    tests
}

fn resolve_test(
    name: Option<String>,
    expression: &str,
    path: ConfigPath,
    scope: &TestScope<'_>,
    diags: &mut Diagnostics,
) -> Option<Test> {
    let expression = expression.trim();
    if expression.is_empty() {
        diags.error(&path, "Test expression must not be empty");
        return None;
    }

    let metrics = match expression::referenced_variables(expression) {
        Ok(metrics) => metrics,
        Err(e) => {
            diags.warning(
                &path,
                format!("Test expression '{}' cannot be parsed: {}", expression, e),
            );
            Vec::new()
        }
    };
    Some(scope.test(name, expression.to_string(), metrics))
}

fn resolve_samples(map: &Mapping, path: ConfigPath, diags: &mut Diagnostics) -> Option<SamplesPolicy> {
    let samples = get_mapping(map, KEY_SAMPLES, &path, diags)?;
    let path = path.key(KEY_SAMPLES);
    check_invalid_keys(samples, SAMPLES_KEYS, &path, diags);

    Some(SamplesPolicy {
        table_limit: get_int(samples, SAMPLES_KEY_TABLE_LIMIT, &path, diags),
        table_tablesample: get_str(samples, SAMPLES_KEY_TABLE_TABLESAMPLE, &path, diags),
        failed_limit: get_int(samples, SAMPLES_KEY_FAILED_LIMIT, &path, diags),
        failed_tablesample: get_str(samples, SAMPLES_KEY_FAILED_TABLESAMPLE, &path, diags),
        passed_limit: get_int(samples, SAMPLES_KEY_PASSED_LIMIT, &path, diags),
        passed_tablesample: get_str(samples, SAMPLES_KEY_PASSED_TABLESAMPLE, &path, diags),
    })
}

// =============================================================================
//  4. TYPED ACCESSORS
// =============================================================================

/// `key: ~` is treated like an absent key.
fn get<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "object",
        Value::Tagged(_) => "tagged value",
    }
}

fn get_str(map: &Mapping, key: &str, path: &ConfigPath, diags: &mut Diagnostics) -> Option<String> {
    match get(map, key)? {
        Value::String(s) => Some(s.clone()),
        other => {
            diags.error(
                &path.key(key),
                format!("Expected a string, not a {}", type_name(other)),
            );
            None
        }
    }
}

fn get_int(map: &Mapping, key: &str, path: &ConfigPath, diags: &mut Diagnostics) -> Option<i64> {
    let value = get(map, key)?;
    match value.as_i64() {
        Some(i) => Some(i),
        None => {
            diags.error(
                &path.key(key),
                format!("Expected an integer, not a {}", type_name(value)),
            );
            None
        }
    }
}

fn get_float(map: &Mapping, key: &str, path: &ConfigPath, diags: &mut Diagnostics) -> Option<f64> {
    let value = get(map, key)?;
    match value.as_f64() {
        Some(f) => Some(f),
        None => {
            diags.error(
                &path.key(key),
                format!("Expected a number, not a {}", type_name(value)),
            );
            None
        }
    }
}

fn get_mapping<'a>(
    map: &'a Mapping,
    key: &str,
    path: &ConfigPath,
    diags: &mut Diagnostics,
) -> Option<&'a Mapping> {
    let value = get(map, key)?;
    match value.as_mapping() {
        Some(m) => Some(m),
        None => {
            diags.error(
                &path.key(key),
                format!("Expected an object, not a {}", type_name(value)),
            );
            None
        }
    }
}

fn get_string_list(
    map: &Mapping,
    key: &str,
    path: &ConfigPath,
    diags: &mut Diagnostics,
) -> Option<Vec<String>> {
    let value = get(map, key)?;
    let Some(items) = value.as_sequence() else {
        diags.error(
            &path.key(key),
            format!("Expected a list, not a {}", type_name(value)),
        );
        return None;
    };

    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item.as_str() {
            Some(s) => out.push(s.to_string()),
            None => diags.error(
                &path.key(key).index(i),
                format!("Expected a string, not a {}", type_name(item)),
            ),
        }
    }
    Some(out)
}

fn get_literal_list(
    map: &Mapping,
    key: &str,
    path: &ConfigPath,
    diags: &mut Diagnostics,
) -> Option<Vec<ConfigLiteral>> {
    let value = get(map, key)?;
    let Some(items) = value.as_sequence() else {
        diags.error(
            &path.key(key),
            format!("Expected a list, not a {}", type_name(value)),
        );
        return None;
    };

    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match ConfigLiteral::from_yaml(item) {
            Some(literal) => out.push(literal),
            None => diags.error(
                &path.key(key).index(i),
                format!("Expected a scalar value, not a {}", type_name(item)),
            ),
        }
    }
    Some(out)
}

fn check_invalid_keys(map: &Mapping, allowed: &[&str], path: &ConfigPath, diags: &mut Diagnostics) {
    for key in map.keys() {
        match key.as_str() {
            Some(k) if allowed.contains(&k) => {}
            Some(k) => diags.error(&path.key(k), format!("Invalid key '{}'", k)),
            None => diags.error(path, format!("Keys must be strings, not a {}", type_name(key))),
        }
    }
}

// =============================================================================
//  5. LOADER
// =============================================================================

#[instrument]
pub fn load_scan_file(path: &Path) -> Result<Resolution, InfrastructureError> {
    if !path.exists() {
        return Err(InfrastructureError::ConfigNotFound(path.display().to_string()));
    }
    let content = fs::read_to_string(path)?;
    let raw: Value = serde_yaml::from_str(&content)?;
    info!(path = ?path, "📄 Scan file loaded");
    Ok(ScanResolver::new(path).resolve(&raw))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::scan::diagnostics::DiagnosticLevel;
    use crate::domain::scan::metric::{
        DISTINCT, MAX, MIN, MISSING_COUNT, MISSING_PERCENTAGE, VALID_COUNT, VALUES_COUNT,
    };
    use anyhow::Result;

    fn resolve_str(yaml: &str) -> Result<Resolution> {
        let raw: Value = serde_yaml::from_str(yaml)?;
        Ok(ScanResolver::new(Path::new("scan.yml")).resolve(&raw))
    }

    fn has(resolution: &Resolution, level: DiagnosticLevel, needle: &str) -> bool {
        resolution
            .diagnostics
            .iter()
            .any(|d| d.level == level && d.message.contains(needle))
    }

    #[test]
    fn test_minimal_table_scan() -> Result<()> {
        let r = resolve_str("table_name: orders\nmetrics: [row_count]\n")?;
        assert!(r.is_valid());
        assert_eq!(r.spec.table_name, "orders");
        assert_eq!(r.spec.metrics, BTreeSet::from([ROW_COUNT.to_string()]));
        assert_eq!(r.spec.sample_method, "SYSTEM");
        Ok(())
    }

    #[test]
    fn test_missing_table_name_is_an_error() -> Result<()> {
        let r = resolve_str("metrics: [row_count]\n")?;
        assert!(!r.is_valid());
        let error = r.diagnostics.errors().next().unwrap();
        assert_eq!(error.path.to_string(), "table_name");
        Ok(())
    }

    #[test]
    fn test_wrong_types_report_their_path() -> Result<()> {
        let r = resolve_str("table_name: [a, b]\nmetrics: 3\n")?;
        assert!(!r.is_valid());
        let paths: Vec<String> = r.diagnostics.errors().map(|d| d.path.to_string()).collect();
        assert!(paths.contains(&"table_name".to_string()));
        assert!(paths.contains(&"metrics".to_string()));
        Ok(())
    }

    #[test]
    fn test_column_valid_count_cascades_to_table_row_count() -> Result<()> {
        let r = resolve_str(
            "table_name: customers\ncolumns:\n  email:\n    valid_format: email\n    metrics: [valid_count]\n",
        )?;
        assert!(r.is_valid());
        let email = r.spec.column("email").unwrap();
        assert!(email.is_metric_enabled(VALID_COUNT));
        assert!(email.is_metric_enabled(MISSING_COUNT));
        assert!(email.is_metric_enabled(MISSING_PERCENTAGE));
        assert!(!email.is_metric_enabled(ROW_COUNT));
        assert!(r.spec.metrics.contains(ROW_COUNT));
        assert!(has(&r, DiagnosticLevel::Info, "row_count"));
        assert_eq!(email.validity_format(), Some("email"));
        Ok(())
    }

    #[test]
    fn test_unknown_names() -> Result<()> {
        let r = resolve_str(
            "table_name: t\nmetrics: [row_cnt]\nmetric_groups: [fancy]\ncolour: blue\n",
        )?;
        assert!(has(&r, DiagnosticLevel::Error, "Invalid metric row_cnt"));
        assert!(has(&r, DiagnosticLevel::Warning, "Invalid metric_group fancy"));
        assert!(has(&r, DiagnosticLevel::Error, "Invalid key 'colour'"));
        Ok(())
    }

    #[test]
    fn test_misspelled_keys_invalidate_the_scan() -> Result<()> {
        let r = resolve_str(
            "table_name: t\ncolumns:\n  email:\n    valid_fromat: email\n    metrics: [valid_count]\n",
        )?;
        assert!(!r.is_valid());
        let error = r.diagnostics.errors().next().unwrap();
        assert_eq!(error.path.to_string(), "columns.email.valid_fromat");

        let r = resolve_str(
            "table_name: t\nsql_metrics:\n  - sql: SELECT 1 AS one\n    metric_name: [one]\n",
        )?;
        assert!(!r.is_valid());
        assert!(has(&r, DiagnosticLevel::Error, "Invalid key 'metric_name'"));

        let r = resolve_str("table_name: t\nsamples:\n  table_limt: 10\n")?;
        assert!(!r.is_valid());
        Ok(())
    }

    #[test]
    fn test_grouped_metrics_are_reported() -> Result<()> {
        let r = resolve_str("table_name: t\ncolumns:\n  id:\n    metrics: [distinct]\n")?;
        assert!(r.is_valid());
        assert!(has(&r, DiagnosticLevel::Warning, "Metrics distinct, unique_count"));
        assert!(r.spec.column("id").unwrap().is_metric_enabled(DISTINCT));

        let r = resolve_str("table_name: t\nmetric_groups: [profiling]\n")?;
        assert!(r.is_valid());
        assert!(has(&r, DiagnosticLevel::Info, "need a grouped query"));
        assert!(!has(&r, DiagnosticLevel::Warning, "need a grouped query"));

        let r = resolve_str("table_name: t\nmins_maxs_limit: 10\n")?;
        assert!(r.is_valid());
        assert!(has(&r, DiagnosticLevel::Info, "mins_maxs_limit has no effect"));
        Ok(())
    }

    #[test]
    fn test_unknown_valid_format_is_kept_with_warning() -> Result<()> {
        let r = resolve_str("table_name: t\ncolumns:\n  c:\n    valid_format: zipcode\n")?;
        assert!(r.is_valid());
        assert!(has(&r, DiagnosticLevel::Warning, "Invalid valid_format: zipcode"));
        assert_eq!(r.spec.column("c").unwrap().validity_format(), Some("zipcode"));
        Ok(())
    }

    #[test]
    fn test_histogram_pulls_in_bounds() -> Result<()> {
        let r = resolve_str("table_name: t\ncolumns:\n  amount:\n    metrics: [histogram]\n")?;
        let amount = r.spec.column("amount").unwrap();
        assert!(amount.is_metric_enabled(MIN));
        assert!(amount.is_metric_enabled(MAX));
        Ok(())
    }

    #[test]
    fn test_failed_rows_synthesizes_test() -> Result<()> {
        let r = resolve_str(
            "table_name: orders\nsql_metrics:\n  - type: failed_rows\n    name: dup_rows\n    sql: select id from orders group by id having count(*) > 1\n",
        )?;
        assert!(r.is_valid());
        assert_eq!(r.spec.sql_metrics.len(), 1);
        let metric = &r.spec.sql_metrics[0];
        assert_eq!(metric.kind, SqlMetricType::FailedRows);
        assert_eq!(metric.tests.len(), 1);
        assert_eq!(metric.tests[0].expression, "dup_rows == 0");
        assert_eq!(metric.tests[0].metrics, vec!["dup_rows"]);
        assert_eq!(
            metric.tests[0].id,
            r#"{"expression":"dup_rows == 0","sql_metric_index":0,"sql_metric_name":"dup_rows"}"#
        );
        Ok(())
    }

    #[test]
    fn test_failed_rows_rejects_bad_identifier() -> Result<()> {
        let r = resolve_str(
            "table_name: orders\nsql_metrics:\n  - type: failed_rows\n    name: 1dup-rows\n    sql: select 1\n",
        )?;
        assert!(!r.is_valid());
        assert!(r.spec.sql_metrics.is_empty());
        let error = r.diagnostics.errors().next().unwrap();
        assert_eq!(error.path.to_string(), "sql_metrics[0].name");
        Ok(())
    }

    #[test]
    fn test_sql_metric_types() -> Result<()> {
        let r = resolve_str(
            "table_name: t\nsql_metrics:\n  - sql: select count(*) as n from t\n  - sql: select country, count(*) as n from t group by country\n    group_fields: [country]\n  - type: histogram\n    sql: select 1\n  - name: nothing\n",
        )?;
        assert_eq!(r.spec.sql_metrics.len(), 2);
        assert_eq!(r.spec.sql_metrics[0].kind, SqlMetricType::Numeric);
        assert_eq!(r.spec.sql_metrics[0].title, "sql_metric[0]");
        assert_eq!(r.spec.sql_metrics[1].kind, SqlMetricType::NumericGroups);
        assert!(has(&r, DiagnosticLevel::Error, "Unknown sql_metric type histogram"));
        assert!(has(&r, DiagnosticLevel::Error, "No sql nor sql_file"));
        Ok(())
    }

    #[test]
    fn test_sql_file_is_read_relative_to_scan_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("sql"))?;
        fs::write(dir.path().join("sql/total.sql"), "SELECT SUM(amount) AS total FROM orders")?;
        let raw: Value = serde_yaml::from_str(
            "table_name: orders\nsql_metrics:\n  - sql_file: sql/total.sql\n    tests: [total > 0]\n",
        )?;
        let r = ScanResolver::new(&dir.path().join("orders.yml")).resolve(&raw);
        assert!(r.is_valid());
        assert!(r.spec.sql_metrics[0].sql.contains("SUM(amount)"));

        let raw: Value =
            serde_yaml::from_str("table_name: orders\nsql_metrics:\n  - sql_file: nope.sql\n")?;
        let r = ScanResolver::new(&dir.path().join("orders.yml")).resolve(&raw);
        assert!(!r.is_valid());
        Ok(())
    }

    #[test]
    fn test_tests_in_list_and_map_form() -> Result<()> {
        let r = resolve_str(
            "table_name: t\ntests: [row_count > 0]\ncolumns:\n  email:\n    metrics: [missing_count]\n    tests:\n      few_missing: missing_percentage < 5\n",
        )?;
        assert_eq!(r.spec.tests[0].title, "test(row_count > 0)");
        assert_eq!(r.spec.tests[0].id, r#"{"expression":"row_count > 0"}"#);

        let test = &r.spec.column("email").unwrap().tests[0];
        assert_eq!(test.name.as_deref(), Some("few_missing"));
        assert_eq!(test.title, "email.test(few_missing)");
        assert_eq!(test.column.as_deref(), Some("email"));
        assert_eq!(test.metrics, vec![MISSING_PERCENTAGE]);
        Ok(())
    }

    #[test]
    fn test_nested_sql_metric_test_title() -> Result<()> {
        let r = resolve_str(
            "table_name: t\ncolumns:\n  amount:\n    sql_metrics:\n      - name: big\n        sql: select count(*) as big from t where amount > 100\n        tests: [big < 10]\n",
        )?;
        let metric = &r.spec.column("amount").unwrap().sql_metrics[0];
        assert_eq!(metric.title, "amount.big");
        assert_eq!(metric.tests[0].title, "amount.big.test(big < 10)");
        Ok(())
    }

    #[test]
    fn test_malformed_expression_is_a_warning() -> Result<()> {
        let r = resolve_str("table_name: t\ntests: ['row_count >']\n")?;
        assert!(r.is_valid());
        assert!(has(&r, DiagnosticLevel::Warning, "cannot be parsed"));
        assert_eq!(r.spec.tests.len(), 1);
        Ok(())
    }

    #[test]
    fn test_filter_and_sampling() -> Result<()> {
        let r = resolve_str(
            "table_name: t\nfilter: \"date = DATE '{{ date }}'\"\nsample_percentage: 50\nsample_method: bernoulli\n",
        )?;
        assert!(r.is_valid());
        assert!(r.spec.filter.is_some());
        assert_eq!(r.spec.sample_percentage, Some(50.0));
        assert_eq!(r.spec.sample_method, "BERNOULLI");

        let r = resolve_str("table_name: t\nfilter: \"date = '{{ date '\"\n")?;
        assert!(!r.is_valid());
        Ok(())
    }

    #[test]
    fn test_column_samples_table_keys_warn() -> Result<()> {
        let r = resolve_str(
            "table_name: t\nsamples:\n  table_limit: 100\ncolumns:\n  c:\n    samples:\n      table_limit: 5\n      failed_limit: 3\n",
        )?;
        assert_eq!(r.spec.table_limit(), Some(100));
        assert!(has(&r, DiagnosticLevel::Warning, "Invalid column samples key 'table_limit'"));
        Ok(())
    }

    #[test]
    fn test_round_trip_through_to_config() -> Result<()> {
        let r = resolve_str(
            "table_name: t\nmetrics: [row_count]\nmetric_groups: [duplicates]\ncolumns:\n  email:\n    valid_format: email\n    missing_values: ['N/A', '-']\n    metrics: [valid_count, min_length]\n  amount:\n    metric_groups: [all]\n    valid_min: 0\n",
        )?;
        assert!(r.is_valid());

        let again = ScanResolver::new(Path::new("scan.yml")).resolve(&r.spec.to_config());
        assert!(again.is_valid());
        assert_eq!(again.spec.metrics, r.spec.metrics);
        for (name, column) in &r.spec.columns {
            let other = again.spec.columns.get(name).unwrap();
            assert_eq!(other.metrics, column.metrics);
            assert_eq!(other.validity, column.validity);
            assert_eq!(other.missing, column.missing);
        }
        Ok(())
    }

    #[test]
    fn test_load_scan_file_not_found() {
        let result = load_scan_file(Path::new("/definitely/not/here.yml"));
        assert!(matches!(result, Err(InfrastructureError::ConfigNotFound(_))));
    }

    #[test]
    fn test_values_count_requires_missing_group() -> Result<()> {
        let r = resolve_str("table_name: t\ncolumns:\n  c:\n    metrics: [values_count]\n")?;
        let c = r.spec.column("c").unwrap();
        assert!(c.is_metric_enabled(VALUES_COUNT));
        assert!(c.is_metric_enabled(MISSING_COUNT));
        Ok(())
    }
}
