//! Differences between two snapshots of one track.

use std::collections::{BTreeMap, BTreeSet};

use ncup_schema::{
    AppChanges, AppId, AppVersion, CandidateSnapshot, Component, ContentHash, CoreChange,
    Downgrade, HashOrSignature, ReleaseSnapshot, ThemeChange, VersionChange, VersionOrdering,
};
use semver::Version;

/// Release notes visible for a move from `old` to `new`: every entry keyed
/// by a version `v` with `old < v <= new`, or `v <= new` when `old` is not
/// a release.
pub fn changelog_window(
    changelogs: &BTreeMap<Version, String>,
    old: &AppVersion,
    new: &AppVersion,
) -> BTreeMap<Version, String> {
    changelogs
        .iter()
        .filter(|(version, _)| new.release().is_none_or(|new| *version <= new))
        .filter(|(version, _)| old.release().is_none_or(|old| *version > old))
        .map(|(version, text)| (version.clone(), text.clone()))
        .collect()
}

/// Comparison of an old and a new snapshot, possibly in different
/// verification states.
#[derive(Debug)]
pub struct ReleaseDiff<'a, A, B> {
    old: &'a ReleaseSnapshot<A>,
    new: &'a ReleaseSnapshot<B>,
}

impl<'a, A, B> ReleaseDiff<'a, A, B> {
    pub fn new(old: &'a ReleaseSnapshot<A>, new: &'a ReleaseSnapshot<B>) -> Self {
        Self { old, new }
    }

    pub fn removed(&self) -> BTreeSet<AppId> {
        self.old
            .apps
            .keys()
            .filter(|id| !self.new.apps.contains_key(*id))
            .cloned()
            .collect()
    }

    pub fn added(&self) -> BTreeMap<AppId, AppVersion> {
        self.new
            .apps
            .iter()
            .filter(|(id, _)| !self.old.apps.contains_key(*id))
            .map(|(id, app)| (id.clone(), app.version()))
            .collect()
    }

    /// Apps present on both sides whose version differs. A move between
    /// internal and external always counts.
    pub fn changed(&self) -> BTreeSet<AppId> {
        self.old
            .apps
            .iter()
            .filter_map(|(id, old)| {
                let new = self.new.apps.get(id)?;
                (old.version().compare(&new.version()) != VersionOrdering::Same)
                    .then(|| id.clone())
            })
            .collect()
    }

    /// Classify every change.
    pub fn changes(&self) -> AppChanges {
        let mut updated = BTreeMap::new();
        let mut downgraded = BTreeMap::new();

        for id in self.changed() {
            let (Some(old), Some(new)) = (self.old.apps.get(&id), self.new.apps.get(&id)) else {
                continue;
            };
            let (old_version, new_version) = (old.version(), new.version());

            match old_version.compare(&new_version) {
                VersionOrdering::Newer => {
                    if let (Some(old), Some(new)) = (old_version.release(), new_version.release()) {
                        downgraded.insert(
                            id,
                            Downgrade {
                                old: old.clone(),
                                new: new.clone(),
                            },
                        );
                    }
                }
                VersionOrdering::Older | VersionOrdering::Incomparable => {
                    let changelogs = match new {
                        Component::External(app) => {
                            changelog_window(&app.changelogs, &old_version, &new_version)
                        }
                        Component::Internal(_) => BTreeMap::new(),
                    };
                    updated.insert(
                        id,
                        VersionChange {
                            old: old_version,
                            new: new_version,
                            changelogs,
                        },
                    );
                }
                VersionOrdering::Same => {}
            }
        }

        AppChanges {
            added: self.added(),
            removed: self.removed(),
            updated,
            downgraded,
        }
    }

    pub fn core_changed(&self) -> bool {
        self.old.core.version != self.new.core.version
    }

    pub fn core_change(&self) -> Option<CoreChange> {
        self.core_changed().then(|| CoreChange {
            old: self.old.core.version.clone(),
            new: self.new.core.version.clone(),
        })
    }

    /// Themes whose pinned revision moved.
    pub fn theme_changes(&self) -> Vec<ThemeChange> {
        self.old
            .themes
            .iter()
            .filter_map(|(id, old)| {
                let new = self.new.themes.get(id)?;
                (old.rev() != new.rev()).then(|| ThemeChange {
                    theme: id.clone(),
                    old_rev: old.rev().to_string(),
                    new_rev: new.rev().to_string(),
                })
            })
            .collect()
    }

    pub fn has_differences(&self) -> bool {
        self.core_changed()
            || self.old.themes != self.new.themes
            || !self.removed().is_empty()
            || !self.added().is_empty()
            || !self.changed().is_empty()
    }
}

impl ReleaseDiff<'_, ContentHash, HashOrSignature> {
    /// Merge the candidate back onto the persisted state.
    ///
    /// Apps on both sides whose version did not change keep their old,
    /// already verified entry. Pins carry over from the old snapshot.
    pub fn join(&self) -> CandidateSnapshot {
        let changed = self.changed();

        let apps = self
            .new
            .apps
            .iter()
            .map(|(id, candidate)| {
                let entry = match self.old.apps.get(id) {
                    Some(old) if !changed.contains(id) => old.clone().into(),
                    _ => candidate.clone(),
                };
                (id.clone(), entry)
            })
            .collect();

        ReleaseSnapshot {
            core: self.new.core.clone(),
            apps,
            themes: self.new.themes.clone(),
            constraints: self.old.constraints.clone(),
            sections: self.old.sections,
        }
    }
}

/// Whether anything differs, and the per-app changes.
pub fn diff<A, B>(old: &ReleaseSnapshot<A>, new: &ReleaseSnapshot<B>) -> (bool, AppChanges) {
    let diff = ReleaseDiff::new(old, new);
    (diff.has_differences(), diff.changes())
}
