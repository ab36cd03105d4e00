use std::path::{Path, PathBuf};

use ncup_schema::Track;

/// Name of the per-track state file.
pub const STATE_FILE: &str = "upstream.json";

/// State file of a track: `<state_dir>/<major>/upstream.json`
pub fn state_file(state_dir: &Path, track: Track) -> PathBuf {
    state_dir.join(track.to_string()).join(STATE_FILE)
}

/// Tracks that already have a state file under `state_dir`, in ascending order.
///
/// A missing `state_dir` yields no tracks.
pub fn discover_tracks(state_dir: &Path) -> std::io::Result<Vec<Track>> {
    let entries = match std::fs::read_dir(state_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut tracks = Vec::new();
    for entry in entries {
        let entry = entry?;
        let Some(major) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u64>().ok())
        else {
            continue;
        };
        if entry.path().join(STATE_FILE).is_file() {
            tracks.push(Track::new(major));
        }
    }
    tracks.sort();
    Ok(tracks)
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    url.split('/').next_back().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_file_layout() {
        assert_eq!(
            state_file(Path::new("package"), Track::new(26)),
            PathBuf::from("package/26/upstream.json")
        );
    }

    #[test]
    fn discovers_numeric_track_dirs_with_state() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["27", "25", "notes", "26"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        for name in ["27", "25", "notes"] {
            std::fs::write(dir.path().join(name).join(STATE_FILE), "{}").unwrap();
        }

        let tracks = discover_tracks(dir.path()).unwrap();
        assert_eq!(tracks, vec![Track::new(25), Track::new(27)]);
    }

    #[test]
    fn missing_state_dir_has_no_tracks() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_tracks(&dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn filename_is_last_segment() {
        assert_eq!(
            filename_from_url("https://download.nextcloud.com/server/releases/nextcloud-25.0.3.tar.bz2"),
            "nextcloud-25.0.3.tar.bz2"
        );
        assert_eq!(filename_from_url("https://example.com/dir/"), "");
    }
}
