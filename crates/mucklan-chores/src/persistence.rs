//! SQLite-backed state: rotation counter plus a log of job runs.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use mucklan_core::error::{MucklanError, Result};
use serde::{Deserialize, Serialize};

use crate::rotation::RotationState;
use crate::store::StateStore;

/// One entry of the job log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub job: String,
    pub outcome: String,
    pub ran_at: DateTime<Utc>,
}

/// SQLite state store.
pub struct SqliteStateStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStateStore {
    /// Open or create the state database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| MucklanError::state(format!("DB open: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, for tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| MucklanError::state(format!("DB open: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| MucklanError::state("state DB lock poisoned"))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            -- Single-row rotation counter
            CREATE TABLE IF NOT EXISTS rotation_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                counter INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Job history
            CREATE TABLE IF NOT EXISTS job_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job TEXT NOT NULL,
                outcome TEXT NOT NULL,
                ran_at TEXT NOT NULL
            );
         ",
            )
            .map_err(|e| MucklanError::state(format!("Migration: {e}")))
    }

    /// Most recent job runs, newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<JobRun>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT job, outcome, ran_at FROM job_runs ORDER BY id DESC LIMIT ?1")
            .map_err(|e| MucklanError::state(format!("Query runs: {e}")))?;

        let rows = stmt
            .query_map([limit as i64], |row| {
                let job: String = row.get(0)?;
                let outcome: String = row.get(1)?;
                let ran_at: String = row.get(2)?;
                Ok((job, outcome, ran_at))
            })
            .map_err(|e| MucklanError::state(format!("Query runs: {e}")))?;

        let mut runs = Vec::new();
        for row in rows {
            let (job, outcome, ran_at) =
                row.map_err(|e| MucklanError::state(format!("Read run: {e}")))?;
            let ran_at = DateTime::parse_from_rfc3339(&ran_at)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| MucklanError::state(format!("Bad timestamp '{ran_at}': {e}")))?;
            runs.push(JobRun { job, outcome, ran_at });
        }
        Ok(runs)
    }
}

impl StateStore for SqliteStateStore {
    fn load(&self) -> Result<Option<RotationState>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT counter FROM rotation_state WHERE id = 1")
            .map_err(|e| MucklanError::state(format!("Load state: {e}")))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| MucklanError::state(format!("Load state: {e}")))?;

        match rows
            .next()
            .map_err(|e| MucklanError::state(format!("Load state: {e}")))?
        {
            Some(row) => {
                let counter: i64 = row
                    .get(0)
                    .map_err(|e| MucklanError::state(format!("Load state: {e}")))?;
                let counter = usize::try_from(counter)
                    .map_err(|_| MucklanError::state(format!("negative counter {counter}")))?;
                Ok(Some(RotationState::new(counter)))
            }
            None => Ok(None),
        }
    }

    fn save(&self, state: &RotationState) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO rotation_state (id, counter, updated_at) VALUES (1, ?1, ?2)",
                rusqlite::params![state.counter as i64, Utc::now().to_rfc3339()],
            )
            .map_err(|e| MucklanError::state(format!("Save state: {e}")))?;
        tracing::debug!("💾 Saved rotation counter {}", state.counter);
        Ok(())
    }

    fn record_run(&self, job: &str, outcome: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO job_runs (job, outcome, ran_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![job, outcome, Utc::now().to_rfc3339()],
            )
            .map_err(|e| MucklanError::state(format!("Record run: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_migrate() {
        let dir = std::env::temp_dir().join("mucklan-state-db-test");
        std::fs::create_dir_all(&dir).ok();
        let db = SqliteStateStore::open(&dir.join("test.db")).unwrap();
        assert_eq!(db.load().unwrap(), None);
        assert!(db.recent_runs(10).unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_overwrites_single_row() {
        let db = SqliteStateStore::in_memory().unwrap();
        db.save(&RotationState::new(1)).unwrap();
        db.save(&RotationState::new(2)).unwrap();
        assert_eq!(db.load().unwrap(), Some(RotationState::new(2)));

        let count: i64 = db
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM rotation_state", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = std::env::temp_dir().join("mucklan-state-db-reopen");
        std::fs::create_dir_all(&dir).ok();
        let path = dir.join("state.db");
        {
            let db = SqliteStateStore::open(&path).unwrap();
            db.save(&RotationState::new(3)).unwrap();
        }
        let db = SqliteStateStore::open(&path).unwrap();
        assert_eq!(db.load().unwrap(), Some(RotationState::new(3)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_job_log_newest_first() {
        let db = SqliteStateStore::in_memory().unwrap();
        db.record_run("rotation", "ok").unwrap();
        db.record_run("bill_check", "no bills").unwrap();
        db.record_run("bill_reminder", "sent").unwrap();

        let runs = db.recent_runs(2).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].job, "bill_reminder");
        assert_eq!(runs[1].job, "bill_check");
        assert_eq!(runs[1].outcome, "no bills");
    }
}
