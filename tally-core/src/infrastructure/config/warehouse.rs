// tally-core/src/infrastructure/config/warehouse.rs

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::infrastructure::error::InfrastructureError;

pub const ENV_DUCKDB_PATH: &str = "TALLY_DUCKDB_PATH";
const IN_MEMORY: &str = ":memory:";

/// Warehouse profile file:
///
/// ```yaml
/// name: local
/// connection:
///   type: duckdb
///   path: warehouse.duckdb
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct WarehouseProfile {
    pub name: String,
    pub connection: ConnectionConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Duckdb {
        #[serde(default = "default_duckdb_path")]
        path: String,
    },
}

fn default_duckdb_path() -> String {
    IN_MEMORY.to_string()
}

#[instrument]
pub fn load_warehouse_profile(path: &Path) -> Result<WarehouseProfile, InfrastructureError> {
    if !path.exists() {
        return Err(InfrastructureError::ConfigNotFound(path.display().to_string()));
    }
    let content = fs::read_to_string(path)?;
    let mut profile: WarehouseProfile = serde_yaml::from_str(&content)?;

    if profile.name.trim().is_empty() {
        return Err(InfrastructureError::ConfigError(format!(
            "Warehouse profile {} has an empty name",
            path.display()
        )));
    }

    // database files are relative to the profile, like sql_file is to the scan
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let ConnectionConfig::Duckdb { path: db_path } = &mut profile.connection;
    if db_path.as_str() != IN_MEMORY && Path::new(db_path.as_str()).is_relative() {
        *db_path = base_dir.join(db_path.as_str()).display().to_string();
    }

    apply_env_overrides(&mut profile);
    info!(warehouse = %profile.name, "🏭 Warehouse profile loaded");
    Ok(profile)
}

fn apply_env_overrides(profile: &mut WarehouseProfile) {
    if let Ok(val) = std::env::var(ENV_DUCKDB_PATH) {
        let ConnectionConfig::Duckdb { path } = &mut profile.connection;
        info!(old = ?path, new = ?val, "Overriding DuckDB path via ENV");
        *path = val;
    }
}

impl WarehouseProfile {
    pub fn duckdb_path(&self) -> PathBuf {
        let ConnectionConfig::Duckdb { path } = &self.connection;
        PathBuf::from(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_profile_paths_are_relative_to_the_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("warehouse.yml");
        fs::write(
            &file,
            "name: local\nconnection:\n  type: duckdb\n  path: data/shop.duckdb\n",
        )?;
        let profile = load_warehouse_profile(&file)?;
        assert_eq!(profile.name, "local");
        if std::env::var(ENV_DUCKDB_PATH).is_err() {
            assert_eq!(profile.duckdb_path(), dir.path().join("data/shop.duckdb"));
        }
        Ok(())
    }

    #[test]
    fn test_in_memory_default() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("warehouse.yml");
        fs::write(&file, "name: mem\nconnection:\n  type: duckdb\n")?;
        let profile = load_warehouse_profile(&file)?;
        if std::env::var(ENV_DUCKDB_PATH).is_err() {
            assert_eq!(profile.duckdb_path(), PathBuf::from(":memory:"));
        }
        Ok(())
    }

    #[test]
    fn test_unknown_connection_type_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("warehouse.yml");
        fs::write(&file, "name: pg\nconnection:\n  type: postgres\n")?;
        assert!(matches!(
            load_warehouse_profile(&file),
            Err(InfrastructureError::YamlError(_))
        ));
        Ok(())
    }
}
