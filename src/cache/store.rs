//! On-disk persistence for the dashboard snapshot
//!
//! The snapshot is stored as a single JSON document next to a timestamp of the
//! last successful update. Writes go to a temporary sibling file which is then
//! renamed over the target, so readers only ever see a complete document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::data::{parse_timestamp, Snapshot};

/// Errors that can occur when saving the snapshot
#[derive(Debug, Error)]
pub enum StoreError {
    /// Creating, writing or renaming a file failed
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The snapshot could not be serialized
    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Document layout written to disk
#[derive(Debug, Serialize)]
struct CacheFileRef<'a> {
    data: &'a Snapshot,
    last_update: DateTime<Utc>,
}

/// Document layout accepted from disk; every field is optional so files from
/// older versions still load
#[derive(Debug, Deserialize)]
struct CacheFile {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    last_update: Option<String>,
}

/// A snapshot read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSnapshot {
    /// The cached data
    pub snapshot: Snapshot,
    /// When the data was last successfully refreshed
    pub last_update: DateTime<Utc>,
}

/// Reads and writes the snapshot file
///
/// Holds nothing but the file path; every call goes straight to disk.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the temporary sibling used during `save`
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Loads the persisted snapshot
    ///
    /// Returns `None` when the file is missing, unreadable or malformed; a bad
    /// cache file is logged and otherwise treated as "no data".
    pub fn load(&self) -> Option<PersistedSnapshot> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No existing cache found");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), "Error reading cache: {}", e);
                return None;
            }
        };

        let file: CacheFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %self.path.display(), "Error parsing cache: {}", e);
                return None;
            }
        };

        let file_update = match file.last_update.as_deref().map(parse_timestamp) {
            Some(Some(at)) => Some(at),
            Some(None) => {
                warn!(path = %self.path.display(), "Ignoring unreadable last_update in cache");
                None
            }
            None => None,
        };

        let mut data = file.data.filter(|data| !data.is_null())?;
        // Older files may only carry the top-level timestamp.
        if let (Some(fields), Some(at)) = (data.as_object_mut(), file_update) {
            if !fields.contains_key("fetched_at") && !fields.contains_key("last_updated") {
                fields.insert("fetched_at".to_string(), at.to_rfc3339().into());
            }
        }

        let snapshot: Snapshot = match serde_json::from_value(data) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %self.path.display(), "Error parsing cached data: {}", e);
                return None;
            }
        };
        let last_update = file_update.unwrap_or(snapshot.fetched_at);

        info!(%last_update, "Loaded cached data");
        Some(PersistedSnapshot {
            snapshot,
            last_update,
        })
    }

    /// Writes the snapshot atomically
    ///
    /// On failure the previous file, if any, is left untouched.
    pub fn save(&self, snapshot: &Snapshot, last_update: DateTime<Utc>) -> Result<(), StoreError> {
        let temp = self.write_temp(snapshot, last_update)?;
        if let Err(e) = self.commit(&temp) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }

        debug!(path = %self.path.display(), "Saved cache");
        Ok(())
    }

    /// First half of `save`: serialize into the temporary sibling
    pub(crate) fn write_temp(
        &self,
        snapshot: &Snapshot,
        last_update: DateTime<Utc>,
    ) -> Result<PathBuf, StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(&CacheFileRef {
            data: snapshot,
            last_update,
        })?;

        let temp = self.temp_path();
        fs::write(&temp, json).map_err(|e| StoreError::io(&temp, e))?;
        Ok(temp)
    }

    /// Second half of `save`: rename the temporary file over the target
    pub(crate) fn commit(&self, temp: &Path) -> Result<(), StoreError> {
        fs::rename(temp, &self.path).map_err(|e| StoreError::io(&self.path, e))
    }

    /// Deletes the cache file and any leftover temporary file
    ///
    /// Returns whether a cache file existed; a missing file is not an error.
    pub fn clear(&self) -> io::Result<bool> {
        let _ = fs::remove_file(self.temp_path());
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{EventInfo, StandingEntry, StandingsInfo};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn create_test_store() -> (SnapshotStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = SnapshotStore::new(temp_dir.path().join("dashboard_data.json"));
        (store, temp_dir)
    }

    fn snapshot(name: &str) -> Snapshot {
        Snapshot {
            next_event: Some(EventInfo {
                name: name.to_string(),
                location: "Spa, Belgium".to_string(),
                date: "2025-07-27".to_string(),
                time: Some("03:00 PM +02:00".to_string()),
                session_type: Some("Race".to_string()),
                round: 13,
            }),
            standings: StandingsInfo {
                drivers: vec![StandingEntry::new("Doe", 10), StandingEntry::new("Roe", 8)],
                constructors: vec![StandingEntry::new("TeamX", 18)],
            },
            event_after_next: None,
            fetched_at: Utc.with_ymd_and_hms(2025, 7, 20, 8, 15, 30).unwrap()
                + chrono::Duration::milliseconds(250),
            fetch_duration_seconds: Some(73.4),
            error: None,
        }
    }

    #[test]
    fn test_load_returns_none_for_missing_file() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_then_load_preserves_snapshot() {
        let (store, _temp_dir) = create_test_store();
        let original = snapshot("Belgian Grand Prix");

        store.save(&original, original.fetched_at).expect("Save should succeed");
        let loaded = store.load().expect("Should load saved snapshot");

        assert_eq!(loaded.snapshot, original);
        assert_eq!(loaded.last_update, original.fetched_at);
    }

    #[test]
    fn test_save_writes_data_and_last_update_keys() {
        let (store, _temp_dir) = create_test_store();
        let original = snapshot("Belgian Grand Prix");

        store.save(&original, original.fetched_at).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(json.get("data").is_some());
        assert_eq!(json["last_update"], "2025-07-20T08:15:30.250Z");
        assert!(!store.temp_path().exists(), "Temp file should be renamed away");
    }

    #[test]
    fn test_interrupted_save_leaves_previous_file_loadable() {
        let (store, _temp_dir) = create_test_store();
        let first = snapshot("Belgian Grand Prix");
        store.save(&first, first.fetched_at).unwrap();

        // Crash between the temp write and the rename.
        let second = snapshot("Hungarian Grand Prix");
        store.write_temp(&second, second.fetched_at).unwrap();

        let loaded = store.load().expect("Original file should still load");
        assert_eq!(loaded.snapshot, first);
    }

    #[test]
    fn test_save_replaces_leftover_temp_file() {
        let (store, _temp_dir) = create_test_store();
        fs::write(store.temp_path(), "{ half a docu").unwrap();

        let original = snapshot("Dutch Grand Prix");
        store.save(&original, original.fetched_at).unwrap();

        assert_eq!(store.load().unwrap().snapshot, original);
    }

    #[test]
    fn test_load_returns_none_for_corrupt_file() {
        let (store, _temp_dir) = create_test_store();
        fs::write(store.path(), "{ not json").unwrap();

        assert!(store.load().is_none());
    }

    #[test]
    fn test_load_returns_none_when_data_is_null() {
        let (store, _temp_dir) = create_test_store();
        fs::write(store.path(), r#"{"data": null, "last_update": null}"#).unwrap();

        assert!(store.load().is_none());
    }

    #[test]
    fn test_load_falls_back_to_fetched_at_without_last_update() {
        let (store, _temp_dir) = create_test_store();
        fs::write(
            store.path(),
            r#"{"data": {"standings": {"drivers": [], "constructors": []},
                         "fetched_at": "2025-07-20T08:15:30Z"}}"#,
        )
        .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(
            loaded.last_update,
            Utc.with_ymd_and_hms(2025, 7, 20, 8, 15, 30).unwrap()
        );
    }

    #[test]
    fn test_load_takes_fetched_at_from_last_update_when_missing() {
        let (store, _temp_dir) = create_test_store();
        fs::write(
            store.path(),
            r#"{"data": {"standings": {"drivers": [{"name": "Doe", "points": 10}],
                                       "constructors": []}},
                "last_update": "2025-07-20T08:15:30Z"}"#,
        )
        .unwrap();

        let loaded = store.load().expect("Top-level last_update should be enough");
        let expected = Utc.with_ymd_and_hms(2025, 7, 20, 8, 15, 30).unwrap();
        assert_eq!(loaded.last_update, expected);
        assert_eq!(loaded.snapshot.fetched_at, expected);
        assert_eq!(loaded.snapshot.standings.drivers[0].name, "Doe");
    }

    #[test]
    fn test_load_returns_none_without_any_timestamp() {
        let (store, _temp_dir) = create_test_store();
        fs::write(
            store.path(),
            r#"{"data": {"standings": {"drivers": [], "constructors": []}}}"#,
        )
        .unwrap();

        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_then_load_preserves_measured_durations() {
        let (store, _temp_dir) = create_test_store();
        let mut original = snapshot("Belgian Grand Prix");
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;

        for _ in 0..2000 {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let nanos = (seed >> 11) % 300_000_000_000;
            original.fetch_duration_seconds =
                Some(std::time::Duration::from_nanos(nanos).as_secs_f64());

            store.save(&original, original.fetched_at).unwrap();
            let loaded = store.load().unwrap();

            assert_eq!(
                loaded.snapshot.fetch_duration_seconds, original.fetch_duration_seconds,
                "Duration changed across save and load"
            );
        }
    }

    #[test]
    fn test_save_creates_directory_if_missing() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("cache");
        let store = SnapshotStore::new(nested.join("dashboard_data.json"));

        let original = snapshot("Italian Grand Prix");
        store.save(&original, original.fetched_at).unwrap();

        assert!(nested.join("dashboard_data.json").exists());
    }

    #[test]
    fn test_save_reports_unwritable_location() {
        let temp_dir = TempDir::new().unwrap();
        // A regular file where the parent directory should be.
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let store = SnapshotStore::new(blocker.join("dashboard_data.json"));

        let original = snapshot("Italian Grand Prix");
        let result = store.save(&original, original.fetched_at);

        assert!(matches!(result, Err(StoreError::Io { .. })));
    }

    #[test]
    fn test_clear_removes_file_and_tolerates_missing() {
        let (store, _temp_dir) = create_test_store();
        let original = snapshot("Italian Grand Prix");
        store.save(&original, original.fetched_at).unwrap();
        fs::write(store.temp_path(), "{ half a docu").unwrap();

        assert!(store.clear().unwrap());
        assert!(!store.path().exists());
        assert!(!store.temp_path().exists());
        assert!(!store.clear().unwrap());
    }
}
