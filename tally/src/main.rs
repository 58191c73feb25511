// tally/src/main.rs

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tally_core::TallyError;
use tally_core::domain::DomainError;
use tally_core::infrastructure::error::InfrastructureError;

use crate::cli::{Cli, Commands};
use crate::commands::scan::ScanArgs;

// 0 = every test passed, 1 = at least one test failed or errored,
// 2 = the scan could not run (configuration, connection, SQL).
const EXIT_TESTS_FAILED: i32 = 1;
const EXIT_ERROR: i32 = 2;

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_TESTS_FAILED),
        Err(e) => {
            report(e);
            std::process::exit(EXIT_ERROR);
        }
    }
}

/// Logs go to stderr so `--format json` keeps stdout parseable.
/// RUST_LOG=debug tally scan ... to see the generated SQL and every measurement.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// `Ok(false)` means the command ran but reported failing tests.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        // --- USE CASE: SCAN ---
        Commands::Scan {
            warehouse,
            scan,
            variables,
            format,
            output,
            skip_sql_metrics,
        } => {
            commands::scan::execute(ScanArgs {
                warehouse,
                scan,
                variables,
                format,
                output,
                skip_sql_metrics,
            })
            .await
        }

        // --- USE CASE: COMPILE ---
        Commands::Compile {
            warehouse,
            scan,
            variables,
        } => commands::compile::execute(warehouse, scan, variables)
            .await
            .map(|_| true),

        // --- USE CASE: COLUMN DISCOVERY ---
        Commands::Columns { warehouse, table } => commands::columns::execute(warehouse, table)
            .await
            .map(|_| true),
    }
}

/// Crate errors carry miette codes and help texts; render them in full.
fn report(error: anyhow::Error) {
    let error = match error.downcast::<TallyError>() {
        Ok(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            return;
        }
        Err(other) => other,
    };
    let error = match error.downcast::<InfrastructureError>() {
        Ok(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            return;
        }
        Err(other) => other,
    };
    match error.downcast::<DomainError>() {
        Ok(e) => eprintln!("{:?}", miette::Report::new(e)),
        Err(other) => eprintln!("💥 {:#}", other),
    }
}
