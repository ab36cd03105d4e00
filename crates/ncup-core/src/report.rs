//! Human-readable change reports across tracks.
//!
//! Outcomes that are identical on several tracks are reported once, under a
//! header naming every track that shares them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;

use ncup_schema::{
    AppChanges, AppId, AppVersion, CoreChange, Downgrade, ThemeChange, Track, VersionChange,
};

use crate::diff::ReleaseDiff;

/// Everything that changed on one track in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackReport {
    pub track: Track,
    pub core: Option<CoreChange>,
    pub apps: AppChanges,
    pub themes: Vec<ThemeChange>,
}

impl TrackReport {
    /// A track with nothing to report. Still counts towards "all tracks".
    pub fn empty(track: Track) -> Self {
        Self {
            track,
            core: None,
            apps: AppChanges::default(),
            themes: Vec::new(),
        }
    }

    pub fn from_diff<A, B>(track: Track, diff: &ReleaseDiff<'_, A, B>) -> Self {
        Self {
            track,
            core: diff.core_change(),
            apps: diff.changes(),
            themes: diff.theme_changes(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.core.is_none() && self.apps.is_empty() && self.themes.is_empty()
    }
}

/// The tracks sharing an outcome.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrackGroup {
    /// Every reported track.
    All,
    Tracks(BTreeSet<Track>),
}

/// Group `items` by `key` across tracks.
///
/// The value kept for a key is the one from the lowest track reporting it.
fn regroup<T, K>(
    items: &BTreeMap<Track, Vec<T>>,
    key: impl Fn(&T) -> K,
) -> BTreeMap<TrackGroup, Vec<T>>
where
    T: Clone,
    K: Eq + Hash,
{
    let all: BTreeSet<Track> = items.keys().copied().collect();
    let mut seen: HashMap<K, (T, BTreeSet<Track>)> = HashMap::new();

    for (track, values) in items {
        for value in values {
            seen.entry(key(value))
                .or_insert_with(|| (value.clone(), BTreeSet::new()))
                .1
                .insert(*track);
        }
    }

    let mut groups: BTreeMap<TrackGroup, Vec<T>> = BTreeMap::new();
    for (value, tracks) in seen.into_values() {
        let group = if tracks == all {
            TrackGroup::All
        } else {
            TrackGroup::Tracks(tracks)
        };
        groups.entry(group).or_default().push(value);
    }
    groups
}

fn header(subject: &str, action: &str, group: &TrackGroup) -> String {
    let tracks: Vec<String> = match group {
        TrackGroup::All => return format!("{subject} {action} for all major versions:\n"),
        TrackGroup::Tracks(tracks) => tracks.iter().map(ToString::to_string).collect(),
    };

    let names = match tracks.split_last() {
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {last}", rest.join(", ")),
        None => String::new(),
    };
    format!("{subject} {action} for major version {names}:\n")
}

fn format_changelog(text: &str, indent: &str) -> String {
    if text.is_empty() {
        return format!("{indent}No changelog provided.\n");
    }
    let mut out = String::new();
    for line in text.trim().lines() {
        if line.trim().is_empty() {
            out.push_str(line);
        } else {
            out.push_str(indent);
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

fn format_update(id: &AppId, change: &VersionChange) -> String {
    match (&change.old, &change.new) {
        (AppVersion::Internal, new) => format!(
            "  {id} (internal -> {new})\n{}",
            format_changelog(
                "The app has been moved out of Nextcloud Server and is now an external app.",
                "    "
            )
        ),
        (old, AppVersion::Internal) => format!(
            "  {id} ({old} -> internal)\n{}",
            format_changelog("The app is now part of Nextcloud Server.", "    ")
        ),
        (old, new) => {
            let mut out = format!("  {id} ({old} -> {new}):\n");
            if change.changelogs.len() > 1 {
                for (version, text) in change.changelogs.iter().rev() {
                    out.push_str(&format!("    Changes for version {version}:\n"));
                    out.push_str(&format_changelog(text, "      "));
                }
            } else {
                let text = change.changelogs.values().next().map_or("", String::as_str);
                out.push_str(&format_changelog(text, "    "));
            }
            out
        }
    }
}

fn per_track<T>(reports: &[TrackReport], f: impl Fn(&TrackReport) -> Vec<T>) -> BTreeMap<Track, Vec<T>> {
    reports.iter().map(|r| (r.track, f(r))).collect()
}

/// Render the changes of every track as one grouped report.
///
/// Core changes come first, then apps added, updated, downgraded and
/// removed, then themes. Returns an empty string if nothing changed.
pub fn render(reports: &[TrackReport]) -> String {
    let mut sections = Vec::new();

    let core: Vec<(Track, &CoreChange)> = reports
        .iter()
        .filter_map(|r| r.core.as_ref().map(|c| (r.track, c)))
        .collect();
    if !core.is_empty() {
        let mut section = String::from("Nextcloud server updated:\n");
        for (track, change) in core {
            section.push_str(&format!("  {track}: {} -> {}\n", change.old, change.new));
        }
        sections.push(section);
    }

    let added = regroup(
        &per_track(reports, |r| {
            r.apps.added.iter().map(|(id, v)| (id.clone(), v.clone())).collect()
        }),
        Clone::clone,
    );
    for (group, mut items) in added {
        items.sort_by(|a, b| a.0.cmp(&b.0));
        let mut section = header("Apps", "added", &group);
        for (id, version) in items {
            match version {
                AppVersion::Internal => section.push_str(&format!("  {id}\n")),
                AppVersion::Release(v) => section.push_str(&format!("  {id} ({v})\n")),
            }
        }
        sections.push(section);
    }

    let updated = regroup(
        &per_track(reports, |r| {
            r.apps.updated.iter().map(|(id, c)| (id.clone(), c.clone())).collect()
        }),
        |(id, change): &(AppId, VersionChange)| (id.clone(), change.old.clone(), change.new.clone()),
    );
    for (group, mut items) in updated {
        items.sort_by(|a, b| a.0.cmp(&b.0));
        let mut section = header("Apps", "updated", &group);
        for (id, change) in &items {
            section.push_str(&format_update(id, change));
        }
        sections.push(section);
    }

    let downgraded = regroup(
        &per_track(reports, |r| {
            r.apps.downgraded.iter().map(|(id, d)| (id.clone(), d.clone())).collect()
        }),
        Clone::clone,
    );
    for (group, mut items) in downgraded {
        items.sort_by(|a, b| a.0.cmp(&b.0));
        let width = items.iter().map(|(id, _)| id.as_str().len()).max().unwrap_or(0) + 2;
        let mut section = header("Apps", "downgraded", &group);
        for (id, Downgrade { old, new }) in &items {
            let label = format!("{id}:");
            section.push_str(&format!("  {label:<width$}{old} -> {new}\n"));
        }
        sections.push(section);
    }

    let removed = regroup(
        &per_track(reports, |r| r.apps.removed.iter().cloned().collect()),
        Clone::clone,
    );
    for (group, mut items) in removed {
        items.sort();
        let mut section = header("Apps", "removed", &group);
        for id in items {
            section.push_str(&format!("  {id}\n"));
        }
        sections.push(section);
    }

    let themes = regroup(
        &per_track(reports, |r| r.themes.clone()),
        |change: &ThemeChange| (change.theme.clone(), change.old_rev.clone(), change.new_rev.clone()),
    );
    for (group, mut items) in themes {
        items.sort_by(|a, b| a.theme.cmp(&b.theme));
        let mut section = header("Themes", "updated", &group);
        for ThemeChange { theme, old_rev, new_rev } in &items {
            section.push_str(&format!("  {theme} ({old_rev} -> {new_rev})\n"));
        }
        sections.push(section);
    }

    sections.join("\n")
}
