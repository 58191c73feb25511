// tally/src/commands/scan.rs
//
// USE CASE: Scan a table and report measurements and test results.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use std::path::PathBuf;
use std::time::Instant;

use tally_core::application::{ScanOptions, ScanResult, run_scan};
use tally_core::infrastructure::fs::write_json;

use crate::cli::OutputFormat;
use crate::commands::{load_scan, open_warehouse, parse_variables};

pub struct ScanArgs {
    pub warehouse: PathBuf,
    pub scan: PathBuf,
    pub variables: Option<String>,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    pub skip_sql_metrics: bool,
}

/// Returns `true` when every test passed.
pub async fn execute(args: ScanArgs) -> anyhow::Result<bool> {
    let start = Instant::now();

    let variables = parse_variables(args.variables.as_deref())?;
    let warehouse = open_warehouse(&args.warehouse)?;
    let resolution = load_scan(&args.scan)?;

    let options = ScanOptions {
        variables,
        skip_sql_metrics: args.skip_sql_metrics,
    };
    let result = run_scan(warehouse.as_ref(), &resolution, &options).await?;

    match args.format {
        OutputFormat::Table => print_tables(&result),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result.to_json())?),
    }

    if let Some(output) = &args.output {
        write_json(output, &result.to_json())?;
        eprintln!("📝 Result written to {}", output.display());
    }

    let failed = result.failures().count();
    if args.format == OutputFormat::Table {
        if failed == 0 {
            println!(
                "\n✨ SUCCESS! {} tests passed in {:.2?}",
                result.test_results.len(),
                start.elapsed()
            );
        } else {
            eprintln!(
                "\n❌ FAILURE. {} of {} tests failed.",
                failed,
                result.test_results.len()
            );
        }
    }
    Ok(failed == 0)
}

fn print_tables(result: &ScanResult) {
    let mut measurements = Table::new();
    measurements
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Column", "Metric", "Value"]);
    for m in &result.measurements {
        measurements.add_row(vec![
            Cell::new(m.column.as_deref().unwrap_or("")),
            Cell::new(&m.metric),
            Cell::new(m.value.to_string()),
        ]);
    }
    println!("\n📊 Measurements for '{}'", result.table);
    println!("{measurements}");

    if result.test_results.is_empty() {
        return;
    }

    let mut tests = Table::new();
    tests
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Test", "Outcome", "Values"]);
    for r in &result.test_results {
        let outcome = match (&r.error, r.passed) {
            (Some(_), _) => Cell::new("ERROR").fg(Color::Red),
            (None, true) => Cell::new("PASS").fg(Color::Green),
            (None, false) => Cell::new("FAIL").fg(Color::Red),
        };
        let values = match &r.error {
            Some(error) => error.clone(),
            None => {
                let mut parts: Vec<String> =
                    r.values.iter().map(|(k, v)| format!("{k}={v}")).collect();
                if let Some(groups) = &r.group_values {
                    parts.extend(groups.iter().map(|(k, v)| format!("[{k}={v}]")));
                }
                parts.join(", ")
            }
        };
        tests.add_row(vec![Cell::new(&r.test.title), outcome, Cell::new(values)]);
    }
    println!("\n🧪 Tests");
    println!("{tests}");
}
