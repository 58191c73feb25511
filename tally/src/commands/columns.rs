// tally/src/commands/columns.rs
//
// USE CASE: List the columns of a table, with the category the dialect assigns them.

use comfy_table::Table;
use comfy_table::presets::UTF8_FULL;
use std::path::PathBuf;

use crate::commands::open_warehouse;

pub async fn execute(warehouse: PathBuf, table: String) -> anyhow::Result<()> {
    let warehouse = open_warehouse(&warehouse)?;
    let columns = warehouse.fetch_columns(&table).await?;
    if columns.is_empty() {
        anyhow::bail!("❌ Table '{}' not found in warehouse '{}'", table, warehouse.name());
    }

    let dialect = warehouse.dialect();
    let mut out = Table::new();
    out.load_preset(UTF8_FULL)
        .set_header(vec!["Column", "Type", "Category", "Nullable"]);
    for column in &columns {
        let category = if dialect.is_text(&column.data_type) {
            "text"
        } else if dialect.is_number(&column.data_type) {
            "number"
        } else if dialect.is_time(&column.data_type) {
            "time"
        } else {
            "-"
        };
        out.add_row(vec![
            column.name.clone(),
            column.data_type.clone(),
            category.to_string(),
            column.nullable.to_string(),
        ]);
    }

    println!("\n🔍 Table '{}' ({} columns)", table, columns.len());
    println!("{out}");
    Ok(())
}
