//! Shared data model for ncup.
//!
//! A [`ReleaseSnapshot`] records the state of one release track: the core
//! server, every app offered for it, the tracked themes and the operator pins.
//! The snapshot is generic over the state of its app artifacts so that only a
//! fully verified [`Snapshot`] can be exported to the persisted format.

pub mod changes;
pub mod hash;
pub mod types;
pub mod version;
pub mod wire;

// Re-exports
pub use changes::*;
pub use hash::*;
pub use types::*;
pub use version::*;
pub use wire::SchemaError;

/// Re-export of the semantic version type used for app releases.
pub use semver::Version;
