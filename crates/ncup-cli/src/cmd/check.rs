//! Check command: validate snapshot files
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use super::read_snapshot;

#[derive(Debug, PartialEq, Eq)]
pub enum FileStatus {
    Canonical,
    NotCanonical,
}

/// Validate one file and compare it with its canonical rendering.
pub fn check_file(path: &Path) -> Result<FileStatus> {
    let (text, snapshot) = read_snapshot(path)?;
    let canonical = snapshot.to_json()?;
    Ok(if canonical == text {
        FileStatus::Canonical
    } else {
        FileStatus::NotCanonical
    })
}

/// Check every file, reporting each one; fails if any file is invalid or
/// not in canonical form.
pub fn check(files: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for path in files {
        match check_file(path) {
            Ok(FileStatus::Canonical) => println!("{}: ok", path.display()),
            Ok(FileStatus::NotCanonical) => {
                println!("{}: valid, not in canonical form", path.display());
                failed += 1;
            }
            Err(e) => {
                println!("{}: {e:#}", path.display());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} files failed the check", files.len());
    }
    Ok(())
}
