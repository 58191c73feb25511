// tally-core/src/application/query_builder.rs

// Compiles a resolved scan into ONE aggregation statement. Every select field is
// created together with the descriptor that will receive its value, and the
// SQL text is rendered from that same list: field i and descriptor i cannot
// drift apart.

use std::collections::BTreeSet;
use tracing::{debug, instrument};

use crate::domain::error::DomainError;
use crate::domain::scan::formats;
use crate::domain::scan::measurement::MeasurementDescriptor;
use crate::domain::scan::metric::{
    self, AVG, AVG_LENGTH, MAX, MAX_LENGTH, MIN, MIN_LENGTH, MISSING_COUNT, ROW_COUNT, STDDEV,
    SUM, VALID_COUNT, VARIANCE,
};
use crate::domain::scan::specification::{MissingPolicy, ScanSpecification, ValidityPolicy};
use crate::ports::dialect::{self, Dialect};
use crate::ports::warehouse::ColumnMetadata;

/// One `SELECT` expression and the measurement it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectField {
    pub expression: String,
    pub descriptor: MeasurementDescriptor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationQuery {
    pub sql: String,
    pub fields: Vec<SelectField>,
}

impl AggregationQuery {
    pub fn descriptors(&self) -> Vec<MeasurementDescriptor> {
        self.fields.iter().map(|f| f.descriptor.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub struct AggregationQueryBuilder<'a> {
    dialect: &'a dyn Dialect,
}

/// Per-column view used while emitting fields.
struct ColumnPlan<'a> {
    name: &'a str,
    quoted: String,
    metrics: BTreeSet<String>,
    is_text: bool,
    is_number: bool,
    is_time: bool,
    missing: Option<&'a MissingPolicy>,
    validity: Option<&'a ValidityPolicy>,
}

impl ColumnPlan<'_> {
    fn enabled(&self, metric: &str) -> bool {
        self.metrics.contains(metric)
    }

    fn is_valid_enabled(&self) -> bool {
        metric::is_validity_enabled(&self.metrics)
    }

    fn is_missing_enabled(&self) -> bool {
        metric::is_missing_enabled(&self.metrics)
    }

    /// `number_*` validity format on a text column: values are cast before aggregating.
    fn number_format(&self) -> Option<&str> {
        if !self.is_text {
            return None;
        }
        self.validity
            .and_then(|v| v.format.as_deref())
            .filter(|f| dialect::is_castable_number_format(f))
    }
}

impl<'a> AggregationQueryBuilder<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Renders the statement. `variables` feed the filter template.
    #[instrument(skip_all, fields(table = %spec.table_name))]
    pub fn build(
        &self,
        spec: &ScanSpecification,
        columns: &[ColumnMetadata],
        variables: &serde_json::Value,
    ) -> Result<AggregationQuery, DomainError> {
        let fields = self.fields(spec, columns);

        let expressions: Vec<&str> = fields.iter().map(|f| f.expression.as_str()).collect();
        let mut sql = format!(
            "SELECT\n  {}\nFROM {}",
            expressions.join(",\n  "),
            self.dialect.qualify_table_name(&spec.table_name)
        );

        if let Some(percentage) = spec.sample_percentage {
            sql.push(' ');
            sql.push_str(&self.dialect.sql_table_sample(&spec.sample_method, percentage));
        }

        if let Some(filter) = &spec.filter {
            let condition = filter
                .render(variables)
                .map_err(|e| DomainError::FilterRender(e.to_string()))?;
            if !condition.is_empty() {
                sql.push_str("\nWHERE ");
                sql.push_str(&condition);
            }
        }

        if let Some(limit) = spec.table_limit() {
            sql.push('\n');
            sql.push_str(&self.dialect.sql_limit(limit));
        }

        debug!(fields = fields.len(), "Aggregation query built");
        Ok(AggregationQuery { sql, fields })
    }

    /// Ordered select fields: `row_count` first, then per column in discovery order.
    pub fn fields(&self, spec: &ScanSpecification, columns: &[ColumnMetadata]) -> Vec<SelectField> {
        let mut fields = vec![SelectField {
            expression: self.dialect.sql_expr_count_all(),
            descriptor: MeasurementDescriptor::table(ROW_COUNT),
        }];

        for column in columns {
            let plan = self.plan(spec, column);
            self.column_fields(&plan, &mut fields);
        }
        fields
    }

    fn plan<'s>(&self, spec: &'s ScanSpecification, column: &'s ColumnMetadata) -> ColumnPlan<'s> {
        let column_spec = spec.column(&column.name);
        ColumnPlan {
            name: &column.name,
            quoted: self.dialect.qualify_column_name(&column.name),
            metrics: spec.column_metrics(&column.name),
            is_text: self.dialect.is_text(&column.data_type),
            is_number: self.dialect.is_number(&column.data_type),
            is_time: self.dialect.is_time(&column.data_type),
            missing: column_spec.and_then(|c| c.missing.as_ref()),
            validity: column_spec.and_then(|c| c.validity.as_ref()),
        }
    }

    fn column_fields(&self, plan: &ColumnPlan<'_>, fields: &mut Vec<SelectField>) {
        let d = self.dialect;
        let mut push = |metric: &str, expression: String| {
            fields.push(SelectField {
                expression,
                descriptor: MeasurementDescriptor::column(metric, plan.name),
            });
        };

        let missing_condition = self.missing_condition(plan);
        let valid_condition = self.valid_condition(plan);
        let non_missing_and_valid = match &valid_condition {
            Some(valid) => format!("NOT {} AND {}", missing_condition, valid),
            None => format!("NOT {}", missing_condition),
        };

        // 1-2. missing / valid counts
        if plan.is_missing_enabled() {
            push(MISSING_COUNT, d.sql_expr_count_conditional(&missing_condition));
        }
        if plan.is_valid_enabled() {
            push(VALID_COUNT, d.sql_expr_count_conditional(&non_missing_and_valid));
        }

        let over_valid = |expr: &str| d.sql_expr_conditional(&non_missing_and_valid, expr);

        // 3. text lengths
        if plan.is_text {
            let length = d.sql_expr_length(&plan.quoted);
            if plan.enabled(MIN_LENGTH) {
                push(MIN_LENGTH, d.sql_expr_min(&over_valid(&length)));
            }
            if plan.enabled(MAX_LENGTH) {
                push(MAX_LENGTH, d.sql_expr_max(&over_valid(&length)));
            }
            if plan.enabled(AVG_LENGTH) {
                push(AVG_LENGTH, d.sql_expr_avg(&over_valid(&length)));
            }
        }

        // 4. numbers stored as text
        if let Some(format) = plan.number_format() {
            let value = over_valid(&d.sql_expr_cast_text_to_number(&plan.quoted, format));
            self.statistics(plan, &value, &mut push);
        }

        // 5. numeric columns
        if plan.is_number {
            let value = over_valid(&plan.quoted);
            self.statistics(plan, &value, &mut push);
        }

        // 6. temporal bounds
        if plan.is_time {
            let value = over_valid(&plan.quoted);
            if plan.enabled(MIN) {
                push(MIN, d.sql_expr_min(&value));
            }
            if plan.enabled(MAX) {
                push(MAX, d.sql_expr_max(&value));
            }
        }

        let grouped = metric::grouped_metrics(&plan.metrics);
        if !grouped.is_empty() {
            debug!(column = plan.name, metrics = ?grouped, "Skipping metrics that need a grouped query");
        }
    }

    fn statistics(&self, plan: &ColumnPlan<'_>, value: &str, push: &mut impl FnMut(&str, String)) {
        let d = self.dialect;
        let aggregates: [(&str, fn(&dyn Dialect, &str) -> String); 6] = [
            (MIN, |d, e| d.sql_expr_min(e)),
            (MAX, |d, e| d.sql_expr_max(e)),
            (AVG, |d, e| d.sql_expr_avg(e)),
            (SUM, |d, e| d.sql_expr_sum(e)),
            (VARIANCE, |d, e| d.sql_expr_variance(e)),
            (STDDEV, |d, e| d.sql_expr_stddev(e)),
        ];
        for (metric, aggregate) in aggregates {
            if plan.enabled(metric) {
                push(metric, aggregate(d, value));
            }
        }
    }

    /// `(col IS NULL OR col IN (...) OR ...)`; plain `IS NULL` without a policy.
    fn missing_condition(&self, plan: &ColumnPlan<'_>) -> String {
        let d = self.dialect;
        let mut parts = vec![format!("{} IS NULL", plan.quoted)];

        if let Some(missing) = plan.missing {
            if let Some(values) = missing.values.as_deref().filter(|v| !v.is_empty()) {
                parts.push(d.sql_expr_in_list(&plan.quoted, values));
            }
            let patterns = [
                missing.format.as_deref().and_then(formats::missing_format),
                missing.regex.as_deref(),
            ];
            for pattern in patterns.into_iter().flatten() {
                if plan.is_text {
                    parts.push(d.sql_expr_regexp_like(&plan.quoted, pattern));
                } else {
                    debug!(column = plan.name, "Missing pattern ignored on a non-text column");
                }
            }
        }
        format!("({})", parts.join(" OR "))
    }

    /// AND of every validity predicate, `None` when the policy yields none.
    fn valid_condition(&self, plan: &ColumnPlan<'_>) -> Option<String> {
        let d = self.dialect;
        let validity = plan.validity?;
        let mut parts = Vec::new();

        let patterns = [
            validity.format.as_deref().and_then(formats::validity_format),
            validity.regex.as_deref(),
        ];
        for pattern in patterns.into_iter().flatten() {
            if plan.is_text {
                parts.push(d.sql_expr_regexp_like(&plan.quoted, pattern));
            } else {
                debug!(column = plan.name, "Validity pattern ignored on a non-text column");
            }
        }

        if let Some(values) = validity.values.as_deref().filter(|v| !v.is_empty()) {
            parts.push(d.sql_expr_in_list(&plan.quoted, values));
        }

        if plan.is_text {
            let length = d.sql_expr_length(&plan.quoted);
            if let Some(min_length) = validity.min_length {
                parts.push(format!("{} >= {}", length, min_length));
            }
            if let Some(max_length) = validity.max_length {
                parts.push(format!("{} <= {}", length, max_length));
            }
        }

        if validity.min.is_some() || validity.max.is_some() {
            let value = if plan.is_number {
                Some(plan.quoted.clone())
            } else {
                plan.number_format()
                    .map(|format| d.sql_expr_cast_text_to_number(&plan.quoted, format))
            };
            match value {
                Some(value) => {
                    if let Some(min) = validity.min {
                        parts.push(format!("{} >= {}", value, d.literal_number(min)));
                    }
                    if let Some(max) = validity.max {
                        parts.push(format!("{} <= {}", value, d.literal_number(max)));
                    }
                }
                None => debug!(column = plan.name, "valid_min/valid_max ignored on a non-numeric column"),
            }
        }

        if parts.is_empty() {
            None
        } else {
            Some(format!("({})", parts.join(" AND ")))
        }
    }
}
