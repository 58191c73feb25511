// tally-core/src/infrastructure/fs.rs

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::infrastructure::error::InfrastructureError;

/// Writes `content` to `path` through a temporary file in the target directory,
/// then renames it into place: readers see the old result or the new one, never
/// a truncated file. Missing parent directories are created.
pub fn atomic_write<P: AsRef<Path>, C: AsRef<[u8]>>(
    path: P,
    content: C,
) -> Result<(), InfrastructureError> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(content.as_ref())?;
    temp_file.flush()?;
    temp_file
        .persist(path)
        .map_err(|e| InfrastructureError::Io(e.error))?;

    debug!(path = %path.display(), "File written");
    Ok(())
}

/// Pretty-printed JSON, written atomically.
pub fn write_json<P: AsRef<Path>, T: Serialize>(
    path: P,
    value: &T,
) -> Result<(), InfrastructureError> {
    let content = serde_json::to_string_pretty(value)?;
    atomic_write(path, content + "\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_missing_directories() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("results/2024/orders.json");

        atomic_write(&file_path, "{}")?;

        assert_eq!(fs::read_to_string(file_path)?, "{}");
        Ok(())
    }

    #[test]
    fn test_write_json_overwrites_previous_result() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("scan.json");

        write_json(&file_path, &json!({ "passed": false }))?;
        write_json(&file_path, &json!({ "passed": true }))?;

        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(file_path)?)?;
        assert_eq!(written["passed"], true);
        Ok(())
    }
}
