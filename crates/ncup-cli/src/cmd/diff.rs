//! Diff command: report the changes between two snapshot files
use std::path::Path;

use anyhow::Result;
use ncup_core::{ReleaseDiff, TrackReport, render};
use ncup_schema::Track;

use super::read_snapshot;

/// Print the report for moving from `old` to `new`.
pub fn diff(old: &Path, new: &Path) -> Result<()> {
    let (_, old) = read_snapshot(old)?;
    let (_, new) = read_snapshot(new)?;

    let track = Track::new(new.core.version.major());
    let report = TrackReport::from_diff(track, &ReleaseDiff::new(&old, &new));

    if report.is_empty() {
        tracing::info!(%track, "no differences");
    } else {
        print!("{}", render(&[report]));
    }
    Ok(())
}
