// tally-core/src/domain/scan/mod.rs

pub mod diagnostics;
pub mod filter;
pub mod formats;
pub mod measurement;
pub mod metric;
pub mod specification;
pub mod test_result;

pub use diagnostics::{ConfigPath, Diagnostic, DiagnosticLevel, Diagnostics};
pub use filter::FilterTemplate;
pub use measurement::{Measurement, MeasurementDescriptor, MetricValue};
pub use metric::{MetricClosure, metric_closure};
pub use specification::{
    ColumnSpec, ConfigLiteral, MissingPolicy, SamplesPolicy, ScanSpecification, SqlMetricSpec,
    SqlMetricType, Test, ValidityPolicy,
};
pub use test_result::TestResult;
