pub mod config;
pub mod diff;
pub mod discovery;
pub mod error;
pub mod index;
pub mod io;
pub mod merge;
pub mod paths;
pub mod report;
pub mod resolver;
pub mod shipped;
pub mod store;
pub mod themes;
pub mod track;
pub mod verify;

mod xml;

pub use config::Config;
pub use diff::{ReleaseDiff, diff};
pub use merge::{AppOutcome, MergeResult, merge};
pub use report::{TrackReport, render};
pub use track::{Reconciled, Services, reconcile_track, run_tracks};

/// User Agent string for upstream requests
pub const USER_AGENT: &str = concat!("ncup/", env!("CARGO_PKG_VERSION"));
