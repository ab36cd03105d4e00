//! ncup - Nextcloud upstream tracker
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Keeps one snapshot per Nextcloud major version (`<state_dir>/<major>/upstream.json`)
//! in step with upstream: the latest core release, every app from the app
//! store that supports it, and the tracked themes.
//!
//! # Commands
//!
//! - `update`: reconcile tracks against upstream and print what changed.
//! - `diff`: print the change report between two snapshot files.
//! - `check`: validate snapshot files and flag non-canonical formatting.

pub mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ncup")]
#[command(author, version, about = "ncup - Nextcloud release snapshot updater")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Reconcile tracks with upstream and print the changes
    Update {
        /// Major version to reconcile (repeatable; default: configured or discovered tracks)
        #[arg(long = "track", value_name = "MAJOR")]
        tracks: Vec<u64>,
        /// Directory holding the per-track state files
        #[arg(long)]
        state_dir: Option<PathBuf>,
        /// Configuration file (default: ./ncup.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the change report between two snapshot files
    Diff {
        /// Previous snapshot
        old: PathBuf,
        /// New snapshot
        new: PathBuf,
    },
    /// Validate snapshot files
    Check {
        /// Snapshot files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}
