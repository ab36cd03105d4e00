pub mod check;
pub mod diff;
pub mod update;

use std::path::Path;

use anyhow::{Context, Result};
use ncup_schema::Snapshot;

/// Read and import a snapshot file.
pub(crate) fn read_snapshot(path: &Path) -> Result<(String, Snapshot)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let snapshot =
        Snapshot::from_json(&text).with_context(|| format!("Invalid snapshot {}", path.display()))?;
    Ok((text, snapshot))
}
