// tally-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Positional mismatch: {fields} query fields but {values} returned values")]
    #[diagnostic(
        code(tally::domain::positional_mismatch),
        help("The aggregation query and its descriptors were built from different lists.")
    )]
    PositionalMismatch { fields: usize, values: usize },

    #[error("Invalid scan specification: {0}")]
    #[diagnostic(
        code(tally::domain::invalid_specification),
        help("Fix the error diagnostics reported for the scan file.")
    )]
    InvalidSpecification(String),

    #[error("Filter could not be rendered: {0}")]
    #[diagnostic(
        code(tally::domain::filter),
        help("Pass every variable used by the filter with --variables.")
    )]
    FilterRender(String),

    #[error("Table '{0}' not found or has no columns")]
    #[diagnostic(code(tally::domain::table_not_found))]
    TableNotFound(String),

    #[error("SQL metric '{metric}' returned an unusable result: {reason}")]
    #[diagnostic(code(tally::domain::sql_metric))]
    SqlMetricResult { metric: String, reason: String },
}
