// tally/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Declarative table profiling: one aggregation query, measurements and tests", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 🔍 Scans a table: measurements, SQL metrics and tests
    Scan {
        /// Warehouse profile (YAML)
        warehouse: PathBuf,

        /// Scan file (YAML)
        scan: PathBuf,

        /// Filter template variables, as a JSON object (ex: '{"date": "2024-01-01"}')
        #[arg(long, short, env = "TALLY_VARIABLES")]
        variables: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Also write the JSON result to this file
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Do not run the sql_metrics of the scan file
        #[arg(long, default_value = "false")]
        skip_sql_metrics: bool,
    },

    /// 🛠️  Prints the aggregation query of a scan without running it
    Compile {
        /// Warehouse profile (YAML)
        warehouse: PathBuf,

        /// Scan file (YAML)
        scan: PathBuf,

        /// Filter template variables, as a JSON object
        #[arg(long, short, env = "TALLY_VARIABLES")]
        variables: Option<String>,
    },

    /// 📋 Lists the columns the warehouse reports for a table
    Columns {
        /// Warehouse profile (YAML)
        warehouse: PathBuf,

        /// Table name
        #[arg(long, short)]
        table: String,
    },
}
