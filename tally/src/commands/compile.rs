// tally/src/commands/compile.rs
//
// USE CASE: Show the aggregation query (and what each field measures) without running it.

use std::path::PathBuf;

use tally_core::application::{ScanOptions, ensure_valid, plan_scan};

use crate::commands::{load_scan, open_warehouse, parse_variables};

pub async fn execute(
    warehouse: PathBuf,
    scan: PathBuf,
    variables: Option<String>,
) -> anyhow::Result<()> {
    let variables = parse_variables(variables.as_deref())?;
    let warehouse = open_warehouse(&warehouse)?;
    let resolution = load_scan(&scan)?;
    let spec = ensure_valid(&resolution)?;

    let options = ScanOptions {
        variables,
        ..ScanOptions::default()
    };
    let plan = plan_scan(warehouse.as_ref(), spec, &options).await?;

    println!("{};", plan.query.sql);
    println!("\n-- {} fields", plan.query.len());
    for (i, field) in plan.query.fields.iter().enumerate() {
        println!("-- [{}] {}", i, field.descriptor);
    }
    Ok(())
}
