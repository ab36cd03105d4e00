//! Per-track state files.

use std::io::Write;
use std::path::Path;

use ncup_schema::{Snapshot, Track};
use tokio::fs;
use tracing::{debug, info};

use crate::error::StoreError;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Load the snapshot at `path`, or the bootstrap state for `track` if the
/// file does not exist yet.
pub async fn load(path: &Path, track: Track) -> Result<Snapshot, StoreError> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(%track, path = %path.display(), "no state yet, starting from bootstrap");
            return Ok(Snapshot::bootstrap(track));
        }
        Err(e) => return Err(io_error(path)(e)),
    };

    Snapshot::from_json(&text).map_err(|source| StoreError::Schema {
        path: path.to_path_buf(),
        source,
    })
}

fn write_atomically(dir: &Path, path: &Path, text: &str) -> Result<(), StoreError> {
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_error(dir))?;
    file.write_all(text.as_bytes()).map_err(io_error(file.path()))?;
    file.as_file().sync_all().map_err(io_error(path))?;
    file.persist(path).map_err(|e| io_error(path)(e.error))?;
    Ok(())
}

/// Atomically replace the snapshot at `path`.
///
/// The new state is written to a temporary file in the same directory and
/// renamed over the old one, so readers see either the old or the new file.
pub async fn save(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let text = snapshot.to_json().map_err(|source| StoreError::Schema {
        path: path.to_path_buf(),
        source,
    })?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).await.map_err(io_error(dir))?;

    // Blocking file IO runs off the runtime threads
    let (dir, target) = (dir.to_path_buf(), path.to_path_buf());
    let bytes = text.len();
    tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &text))
        .await
        .map_err(|e| io_error(path)(std::io::Error::other(e)))??;

    debug!(path = %path.display(), bytes, "saved state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::state_file;
    use ncup_schema::CoreVersion;

    const STATE: &str = r#"{
  "applications": {},
  "nextcloud": {
    "version": "26"
  }
}
"#;

    #[tokio::test]
    async fn missing_file_bootstraps() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = load(&dir.path().join("26/upstream.json"), Track::new(26))
            .await
            .unwrap();
        assert_eq!(snapshot, Snapshot::bootstrap(Track::new(26)));
    }

    #[tokio::test]
    async fn save_creates_directories_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = state_file(dir.path(), Track::new(26));

        let snapshot = Snapshot::bootstrap(Track::new(26));
        save(&path, &snapshot).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), STATE);
        assert_eq!(load(&path, Track::new(26)).await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn save_replaces_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.json");
        std::fs::write(&path, "old contents").unwrap();

        let mut snapshot = Snapshot::bootstrap(Track::new(27));
        snapshot.core.version = CoreVersion::parse("27.1.0").unwrap();
        save(&path, &snapshot).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(std::fs::read_to_string(&path).unwrap().contains("27.1.0"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn concurrent_saves_on_one_runtime_thread() {
        let dir = tempfile::tempdir().unwrap();
        let tracks = [Track::new(25), Track::new(26), Track::new(27)];
        let snapshots: Vec<_> = tracks.iter().map(|t| Snapshot::bootstrap(*t)).collect();
        let paths: Vec<_> = tracks.iter().map(|t| state_file(dir.path(), *t)).collect();

        let saves = paths.iter().zip(&snapshots).map(|(path, snapshot)| save(path, snapshot));
        for result in futures::future::join_all(saves).await {
            result.unwrap();
        }

        for (path, track) in paths.iter().zip(tracks) {
            assert_eq!(load(path, track).await.unwrap(), Snapshot::bootstrap(track));
        }
    }

    #[tokio::test]
    async fn corrupt_state_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            load(&path, Track::new(26)).await,
            Err(StoreError::Schema { .. })
        ));
    }
}
