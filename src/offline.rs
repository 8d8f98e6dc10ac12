//! Durable offline flag.
//!
//! The only state the engine persists: `{ "offline": bool, "since": timestamp }`.

use crate::error::{RecoveryError, RecoveryResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persisted offline marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineFlag {
    pub offline: bool,
    pub since: DateTime<Utc>,
}

impl OfflineFlag {
    pub fn offline_since(since: DateTime<Utc>) -> Self {
        Self {
            offline: true,
            since,
        }
    }
}

/// Storage for the offline flag.
pub trait OfflineStore: fmt::Debug + Send + Sync {
    fn load(&self) -> RecoveryResult<Option<OfflineFlag>>;
    fn save(&self, flag: &OfflineFlag) -> RecoveryResult<()>;
    /// Remove the flag. Clearing an absent flag is not an error.
    fn clear(&self) -> RecoveryResult<()>;
}

/// Process-local store, used when no path is configured.
#[derive(Debug, Default)]
pub struct MemoryOfflineStore {
    flag: Mutex<Option<OfflineFlag>>,
}

impl MemoryOfflineStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<OfflineFlag>> {
        self.flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl OfflineStore for MemoryOfflineStore {
    fn load(&self) -> RecoveryResult<Option<OfflineFlag>> {
        Ok(*self.slot())
    }

    fn save(&self, flag: &OfflineFlag) -> RecoveryResult<()> {
        *self.slot() = Some(*flag);
        Ok(())
    }

    fn clear(&self) -> RecoveryResult<()> {
        *self.slot() = None;
        Ok(())
    }
}

/// JSON file store that survives restarts. Writes go through a temp file and
/// a rename so a crash never leaves a half-written flag.
#[derive(Debug, Clone)]
pub struct FileOfflineStore {
    path: PathBuf,
}

impl FileOfflineStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> RecoveryResult<PathBuf> {
        let file_name = self.path.file_name().ok_or_else(|| {
            RecoveryError::persistence(format!(
                "offline flag path {} has no file name",
                self.path.display()
            ))
        })?;
        Ok(self.path.with_file_name(format!(
            ".{}.tmp-{}",
            file_name.to_string_lossy(),
            std::process::id()
        )))
    }
}

impl OfflineStore for FileOfflineStore {
    fn load(&self) -> RecoveryResult<Option<OfflineFlag>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, flag: &OfflineFlag) -> RecoveryResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec(flag)?;
        let temp_path = self.temp_path()?;

        let write_result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
            Ok(())
        })();
        if let Err(err) = write_result {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }
        tracing::debug!(path = %self.path.display(), offline = flag.offline, "offline flag saved");
        Ok(())
    }

    fn clear(&self) -> RecoveryResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_should_round_trip_and_clear() {
        let store = MemoryOfflineStore::new();
        assert_eq!(store.load().unwrap(), None);

        let flag = OfflineFlag::offline_since(Utc::now());
        store.save(&flag).unwrap();
        assert_eq!(store.load().unwrap(), Some(flag));

        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_file_store_should_survive_a_new_instance() {
        // Given: a flag written by one store
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("offline.json");
        let flag = OfflineFlag::offline_since(Utc::now());
        FileOfflineStore::new(&path).save(&flag).unwrap();

        // When: a fresh store reads the same path
        let reloaded = FileOfflineStore::new(&path).load().unwrap();

        // Then: the flag is intact and no temp file is left behind
        assert_eq!(reloaded, Some(flag));
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_file_store_clear_should_tolerate_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOfflineStore::new(dir.path().join("offline.json"));

        assert!(store.clear().is_ok());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_file_store_should_reject_corrupt_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline.json");
        fs::write(&path, "not json").unwrap();

        let result = FileOfflineStore::new(&path).load();

        assert!(matches!(result, Err(RecoveryError::Serialization(_))));
    }
}
