//! Rotation-state persistence.
//! The counter is saved before any assignment is delivered, so a crash
//! mid-delivery never repeats a rotation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mucklan_core::config::{StateBackend, StateConfig};
use mucklan_core::error::{MucklanError, Result};
use serde::{Deserialize, Serialize};

use crate::persistence::SqliteStateStore;
use crate::rotation::RotationState;

/// Durable home of the rotation counter.
pub trait StateStore: Send + Sync {
    /// Last saved state, or `None` before the first rotation.
    fn load(&self) -> Result<Option<RotationState>>;

    /// Replace the saved state.
    fn save(&self, state: &RotationState) -> Result<()>;

    /// Append an entry to the job log, if the backend keeps one.
    fn record_run(&self, job: &str, outcome: &str) -> Result<()> {
        tracing::debug!("📝 {job}: {outcome}");
        Ok(())
    }
}

/// Open the store selected in `[state]`.
pub fn open_store(config: &StateConfig) -> Result<Box<dyn StateStore>> {
    let path = config.resolved_path();
    match config.backend {
        StateBackend::Json => Ok(Box::new(JsonStateStore::new(&path)?)),
        StateBackend::Sqlite => Ok(Box::new(SqliteStateStore::open(&path)?)),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    counter: usize,
    updated_at: DateTime<Utc>,
}

/// Human-readable JSON side file.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    /// Create a store writing to `path`, creating parent directories.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<Option<RotationState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&self.path)?;
        let file: StateFile = serde_json::from_str(&json).map_err(|e| {
            MucklanError::state(format!("corrupt state file {}: {e}", self.path.display()))
        })?;
        Ok(Some(RotationState::new(file.counter)))
    }

    fn save(&self, state: &RotationState) -> Result<()> {
        let file = StateFile {
            counter: state.counter,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!("💾 Saved rotation counter {} to {}", state.counter, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_none() {
        let dir = std::env::temp_dir().join("mucklan-test-json-missing");
        std::fs::remove_dir_all(&dir).ok();
        let store = JsonStateStore::new(&dir.join("state.json")).unwrap();
        assert_eq!(store.load().unwrap(), None);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join("mucklan-test-json-roundtrip");
        let store = JsonStateStore::new(&dir.join("state.json")).unwrap();
        store.save(&RotationState::new(2)).unwrap();
        assert_eq!(store.load().unwrap(), Some(RotationState::new(2)));

        store.save(&RotationState::new(0)).unwrap();
        assert_eq!(store.load().unwrap(), Some(RotationState::new(0)));
        assert!(!store.path().with_extension("json.tmp").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = std::env::temp_dir().join("mucklan-test-json-corrupt");
        let store = JsonStateStore::new(&dir.join("state.json")).unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(MucklanError::State(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_open_store_by_backend() {
        let dir = std::env::temp_dir().join("mucklan-test-open-store");
        let config = StateConfig {
            backend: StateBackend::Sqlite,
            path: dir.join("state.db").to_string_lossy().to_string(),
        };
        let store = open_store(&config).unwrap();
        store.save(&RotationState::new(1)).unwrap();
        assert_eq!(store.load().unwrap(), Some(RotationState::new(1)));
        std::fs::remove_dir_all(&dir).ok();
    }
}
