// tally-core/src/application/mod.rs

pub mod engine;
pub mod evaluator;
pub mod query_builder;
pub mod reducer;
pub mod scan;
pub mod sql_metrics;

// --- RE-EXPORTS (FACADE PATTERN) ---
// `use tally_core::application::{run_scan, ScanOptions};` from the CLI.

pub use evaluator::evaluate_tests;
pub use query_builder::{AggregationQuery, AggregationQueryBuilder, SelectField};
pub use scan::{ScanOptions, ScanPlan, ScanResult, ensure_valid, plan_scan, run_scan};
pub use sql_metrics::{SqlMetricOutcome, SqlMetricRunner};
