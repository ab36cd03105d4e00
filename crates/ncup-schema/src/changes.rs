//! Change records produced by diffing two snapshots.

use std::collections::{BTreeMap, BTreeSet};

use semver::Version;

use crate::types::{AppId, ThemeId};
use crate::version::{AppVersion, CoreVersion};

/// An app moving to a newer version (or across the internal/external boundary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChange {
    /// Version before the change.
    pub old: AppVersion,
    /// Version after the change.
    pub new: AppVersion,
    /// Release notes for every version in the window `(old, new]`.
    pub changelogs: BTreeMap<Version, String>,
}

/// An app moving to an older release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Downgrade {
    /// Version before the change.
    pub old: Version,
    /// Version after the change.
    pub new: Version,
}

/// Per-app changes between two snapshots of one track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppChanges {
    /// Apps that appeared, with their new version.
    pub added: BTreeMap<AppId, AppVersion>,
    /// Apps that disappeared.
    pub removed: BTreeSet<AppId>,
    /// Apps that moved forward.
    pub updated: BTreeMap<AppId, VersionChange>,
    /// Apps that moved back.
    pub downgraded: BTreeMap<AppId, Downgrade>,
}

impl AppChanges {
    /// Returns `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.updated.is_empty()
            && self.downgraded.is_empty()
    }

    /// Identifiers of every app whose version changed (updated or downgraded).
    pub fn version_changed(&self) -> BTreeSet<AppId> {
        self.updated
            .keys()
            .chain(self.downgraded.keys())
            .cloned()
            .collect()
    }

    /// Withdraw a version change that was not carried out.
    ///
    /// Returns `true` if `app` was listed as updated or downgraded.
    pub fn retract_version_change(&mut self, app: &AppId) -> bool {
        let updated = self.updated.remove(app).is_some();
        let downgraded = self.downgraded.remove(app).is_some();
        updated || downgraded
    }

    /// Withdraw an addition that was not carried out.
    ///
    /// Returns `true` if `app` was listed as added.
    pub fn retract_addition(&mut self, app: &AppId) -> bool {
        self.added.remove(app).is_some()
    }
}

/// The core server moving between versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreChange {
    /// Version before the change.
    pub old: CoreVersion,
    /// Version after the change.
    pub new: CoreVersion,
}

/// A theme moving to a new upstream revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeChange {
    /// Theme that changed.
    pub theme: ThemeId,
    /// Revision before the change.
    pub old_rev: String,
    /// Revision after the change.
    pub new_rev: String,
}
