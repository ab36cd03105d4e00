//! Update command: reconcile tracks with upstream
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use ncup_core::paths::discover_tracks;
use ncup_core::{AppOutcome, Config, Services, TrackReport, render, run_tracks};
use ncup_schema::Track;
use tracing::{error, info};

/// Tracks to reconcile: flags first, then configuration, then whatever
/// already has state on disk.
pub fn select_tracks(flags: &[u64], config: &Config) -> Result<Vec<Track>> {
    let mut majors = if flags.is_empty() {
        config.tracks.clone()
    } else {
        flags.to_vec()
    };
    majors.sort_unstable();
    majors.dedup();

    if !majors.is_empty() {
        return Ok(majors.into_iter().map(Track::new).collect());
    }

    let found = discover_tracks(&config.state_dir)
        .with_context(|| format!("Failed to scan {}", config.state_dir.display()))?;
    if found.is_empty() {
        bail!(
            "No tracks given and none found under {}; pass --track <MAJOR>",
            config.state_dir.display()
        );
    }
    Ok(found)
}

/// Reconcile every selected track and print the grouped report.
///
/// Tracks that succeed are persisted even if others fail; any failure makes
/// the command fail after the report is printed.
pub async fn update(flags: &[u64], state_dir: Option<PathBuf>, config: Option<&Path>) -> Result<()> {
    let mut config = Config::load(config)?;
    if let Some(dir) = state_dir {
        config.state_dir = dir;
    }

    let tracks = select_tracks(flags, &config)?;
    let services = Services::from_config(&config).context("Failed to build HTTP clients")?;
    info!(tracks = ?tracks, state_dir = %config.state_dir.display(), "starting update");

    let results = run_tracks(&config, &services, &tracks).await;

    let mut reports = Vec::new();
    let mut failed = Vec::new();
    for (track, result) in results {
        match result {
            Ok(reconciled) => {
                let rolled_back = reconciled
                    .outcomes
                    .values()
                    .filter(|o| **o != AppOutcome::Verified)
                    .count();
                if rolled_back > 0 {
                    info!(%track, rolled_back, "some apps kept their previous state");
                }
                reports.push(reconciled.report);
            }
            Err(e) => {
                error!(%track, error = %e, "track failed");
                // Keeps shared changes from being reported for all tracks
                reports.push(TrackReport::empty(track));
                failed.push(track);
            }
        }
    }

    let text = render(&reports);
    if text.is_empty() {
        info!("everything is up to date");
    } else {
        print!("{text}");
    }

    if !failed.is_empty() {
        let names: Vec<String> = failed.iter().map(ToString::to_string).collect();
        bail!("Reconciliation failed for track(s) {}", names.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_win_over_configuration() {
        let config = Config {
            tracks: vec![25, 26],
            ..Config::default()
        };
        assert_eq!(
            select_tracks(&[27, 27], &config).unwrap(),
            vec![Track::new(27)]
        );
        assert_eq!(
            select_tracks(&[], &config).unwrap(),
            vec![Track::new(25), Track::new(26)]
        );
    }

    #[test]
    fn tracks_are_discovered_from_state() {
        let dir = tempfile::tempdir().unwrap();
        for major in ["26", "25", "notes"] {
            let track_dir = dir.path().join(major);
            std::fs::create_dir_all(&track_dir).unwrap();
            std::fs::write(track_dir.join("upstream.json"), "{}").unwrap();
        }
        let config = Config {
            state_dir: dir.path().to_path_buf(),
            ..Config::default()
        };

        assert_eq!(
            select_tracks(&[], &config).unwrap(),
            vec![Track::new(25), Track::new(26)]
        );
    }

    #[test]
    fn nothing_to_do_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            state_dir: dir.path().join("missing"),
            ..Config::default()
        };
        assert!(select_tracks(&[], &config).is_err());
    }
}
