// tally/src/commands/mod.rs

pub mod columns;
pub mod compile;
pub mod scan;

use anyhow::{Context, bail};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use tally_core::domain::scan::{DiagnosticLevel, Diagnostics};
use tally_core::infrastructure::adapters::connect;
use tally_core::infrastructure::config::{Resolution, load_scan_file, load_warehouse_profile};
use tally_core::ports::Warehouse;

/// Loads the warehouse profile and opens the connection it describes.
pub fn open_warehouse(profile_path: &Path) -> anyhow::Result<Arc<dyn Warehouse>> {
    let profile = load_warehouse_profile(profile_path)?;
    let warehouse = connect(&profile)
        .with_context(|| format!("Cannot open warehouse '{}'", profile.name))?;
    info!(warehouse = warehouse.name(), dialect = warehouse.dialect().name(), "🔌 Connected");
    Ok(warehouse)
}

/// Resolves a scan file and prints its diagnostics to stderr.
pub fn load_scan(scan_path: &Path) -> anyhow::Result<Resolution> {
    info!(scan = %scan_path.display(), "⚙️  Loading scan");
    let resolution = load_scan_file(scan_path)?;
    report_diagnostics(&resolution.diagnostics);
    Ok(resolution)
}

pub fn report_diagnostics(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        let icon = match diagnostic.level {
            DiagnosticLevel::Error => "❌",
            DiagnosticLevel::Warning => "⚠️ ",
            DiagnosticLevel::Info => "ℹ️ ",
        };
        eprintln!("{} {}", icon, diagnostic);
    }
}

/// `--variables` must be a JSON object; absent means no variables.
pub fn parse_variables(raw: Option<&str>) -> anyhow::Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Object(Default::default()));
    };
    let value: Value = serde_json::from_str(raw).context("--variables is not valid JSON")?;
    if !value.is_object() {
        bail!("--variables must be a JSON object, got: {}", raw);
    }
    Ok(value)
}
