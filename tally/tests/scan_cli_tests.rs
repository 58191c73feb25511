use anyhow::{Context, Result};
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// A DuckDB file with a `customers` table, a warehouse profile pointing to it
/// and room for scan files.
struct TallyTestEnv {
    _tmp: TempDir,
    root: PathBuf,
}

impl TallyTestEnv {
    fn new() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().to_path_buf();

        {
            // closed before the CLI opens the file
            let conn = duckdb::Connection::open(root.join("shop.duckdb"))?;
            conn.execute_batch(
                "CREATE TABLE customers (id INTEGER, email VARCHAR, country VARCHAR);
                 INSERT INTO customers VALUES
                   (1, 'ann@shop.com', 'BE'),
                   (2, 'bob@shop',     'BE'),
                   (3, NULL,           'NL'),
                   (4, 'eve@shop.com', 'NL');",
            )?;
        }

        fs::write(
            root.join("warehouse.yml"),
            "name: shop\nconnection:\n  type: duckdb\n  path: shop.duckdb\n",
        )?;

        Ok(Self { _tmp: tmp, root })
    }

    fn write_scan(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.root.join(name);
        fs::write(&path, content)?;
        Ok(path)
    }

    fn tally(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tally"));
        cmd.current_dir(&self.root);
        cmd.env_remove("TALLY_DUCKDB_PATH");
        cmd.env_remove("TALLY_VARIABLES");
        cmd
    }
}

const PASSING_SCAN: &str = r#"
table_name: customers
metrics: [row_count]
tests:
  - row_count == 4
columns:
  email:
    metrics: [missing_count]
    tests:
      - missing_percentage <= 25
"#;

const FAILING_SCAN: &str = r#"
table_name: customers
columns:
  email:
    valid_format: email
    metrics: [invalid_count]
    tests:
      - invalid_count == 0
"#;

#[test]
fn test_scan_success() -> Result<()> {
    let env = TallyTestEnv::new()?;
    env.write_scan("customers.yml", PASSING_SCAN)?;

    env.tally()
        .args(["scan", "warehouse.yml", "customers.yml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("row_count"))
        .stdout(predicate::str::contains("missing_percentage"))
        .stdout(predicate::str::contains("SUCCESS! 2 tests passed"));
    Ok(())
}

#[test]
fn test_scan_with_failing_test_exits_with_one() -> Result<()> {
    let env = TallyTestEnv::new()?;
    env.write_scan("customers.yml", FAILING_SCAN)?;

    env.tally()
        .args(["scan", "warehouse.yml", "customers.yml"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("FAIL"))
        .stderr(predicate::str::contains("1 of 1 tests failed"));
    Ok(())
}

#[test]
fn test_invalid_scan_file_exits_with_two() -> Result<()> {
    let env = TallyTestEnv::new()?;
    env.write_scan("broken.yml", "metrics: [row_count, no_such_metric]\n")?;

    env.tally()
        .args(["scan", "warehouse.yml", "broken.yml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("table_name"))
        .stderr(predicate::str::contains("no_such_metric"));
    Ok(())
}

#[test]
fn test_json_output_and_result_file() -> Result<()> {
    let env = TallyTestEnv::new()?;
    env.write_scan("customers.yml", PASSING_SCAN)?;

    let output = env
        .tally()
        .args([
            "scan",
            "warehouse.yml",
            "customers.yml",
            "--format",
            "json",
            "--output",
            "results/customers.json",
        ])
        .output()?;
    assert!(output.status.success());

    let stdout: serde_json::Value = serde_json::from_slice(&output.stdout)
        .context("stdout should be a single JSON document")?;
    assert_eq!(stdout["table"], "customers");
    assert_eq!(stdout["summary"]["passed"], 2);

    let written = fs::read_to_string(env.root.join("results/customers.json"))?;
    let file: serde_json::Value = serde_json::from_str(&written)?;
    assert_eq!(file["testResults"][0]["expression"], "row_count == 4");
    assert_eq!(file["testResults"][1]["columnName"], "email");
    Ok(())
}

#[test]
fn test_filter_variables() -> Result<()> {
    let env = TallyTestEnv::new()?;
    env.write_scan(
        "filtered.yml",
        "table_name: customers\nfilter: \"country = '{{ country }}'\"\ntests:\n  - row_count == 2\n",
    )?;

    env.tally()
        .args(["scan", "warehouse.yml", "filtered.yml", "--variables", r#"{"country": "NL"}"#])
        .assert()
        .success();

    // strict templates: a missing variable is an error, not an empty filter
    env.tally()
        .args(["scan", "warehouse.yml", "filtered.yml"])
        .assert()
        .code(2);
    Ok(())
}

#[test]
fn test_compile_prints_sql_and_descriptors() -> Result<()> {
    let env = TallyTestEnv::new()?;
    env.write_scan("customers.yml", PASSING_SCAN)?;

    env.tally()
        .args(["compile", "warehouse.yml", "customers.yml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SELECT"))
        .stdout(predicate::str::contains("FROM \"customers\""))
        .stdout(predicate::str::contains("-- [0] row_count"))
        .stdout(predicate::str::contains("-- [1] missing_count(email)"));
    Ok(())
}

#[test]
fn test_columns_lists_categories() -> Result<()> {
    let env = TallyTestEnv::new()?;

    env.tally()
        .args(["columns", "warehouse.yml", "--table", "customers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("email"))
        .stdout(predicate::str::contains("text"))
        .stdout(predicate::str::contains("number"));

    env.tally()
        .args(["columns", "warehouse.yml", "--table", "nope"])
        .assert()
        .code(2);
    Ok(())
}

#[test]
fn test_missing_profile() -> Result<()> {
    let env = TallyTestEnv::new()?;
    env.write_scan("customers.yml", PASSING_SCAN)?;

    env.tally()
        .args(["scan", "nowhere.yml", "customers.yml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nowhere.yml"));
    Ok(())
}
