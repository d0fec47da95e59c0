//! SQLite storage shared by the local backend and the history log.
//!
//! Two tables:
//! - `kv`: key-value slots; the local backend keeps the whole clock state
//!   as one JSON document under a fixed key
//! - `focus_history`: completed focus sessions, append-only

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::history::CompletedFocusEntry;

use super::data_dir;

/// SQLite database for clock state and focus history.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `<data dir>/focusclock.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::open_at(&dir.join("focusclock.db"))
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and throwaway sessions).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("database lock poisoned".into()))
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS focus_history (
                seq              INTEGER PRIMARY KEY AUTOINCREMENT,
                id               TEXT NOT NULL UNIQUE,
                duration_minutes INTEGER NOT NULL,
                completed_at     TEXT NOT NULL,
                label            TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_focus_history_completed_at ON focus_history(completed_at);",
        )?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Append a completed focus session. Re-appending the same id is a no-op.
    pub fn insert_focus_entry(&self, entry: &CompletedFocusEntry) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT OR IGNORE INTO focus_history (id, duration_minutes, completed_at, label)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.id,
                entry.duration_minutes,
                entry.completed_at.to_rfc3339(),
                entry.label,
            ],
        )?;
        Ok(())
    }

    /// All completed focus sessions in append order.
    pub fn focus_entries(&self) -> Result<Vec<CompletedFocusEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, duration_minutes, completed_at, label
             FROM focus_history
             ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, duration_minutes, completed_at, label) = row?;
            // A row with an unreadable timestamp is skipped rather than
            // failing the whole scan.
            let Ok(completed_at) = DateTime::parse_from_rfc3339(&completed_at) else {
                tracing::warn!("skipping focus entry {id} with bad timestamp");
                continue;
            };
            entries.push(CompletedFocusEntry {
                id,
                duration_minutes,
                completed_at: completed_at.with_timezone(&Utc),
                label,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
        db.kv_set("test", "again").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "again");
    }

    #[test]
    fn focus_entries_keep_append_order() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        let first = CompletedFocusEntry::new(25, now, "Focus");
        let second = CompletedFocusEntry::new(50, now - chrono::Duration::hours(1), "Deep");
        db.insert_focus_entry(&first).unwrap();
        db.insert_focus_entry(&second).unwrap();

        let entries = db.focus_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, first.id);
        assert_eq!(entries[1].label, "Deep");
        assert_eq!(
            entries[0].completed_at.timestamp_millis(),
            now.timestamp_millis()
        );
    }

    #[test]
    fn duplicate_entry_is_ignored() {
        let db = Database::open_memory().unwrap();
        let entry = CompletedFocusEntry::new(25, Utc::now(), "Focus");
        db.insert_focus_entry(&entry).unwrap();
        db.insert_focus_entry(&entry).unwrap();
        assert_eq!(db.focus_entries().unwrap().len(), 1);
    }

    #[test]
    fn open_at_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focusclock.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.kv_set("clock_state", "{}").unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.kv_get("clock_state").unwrap().as_deref(), Some("{}"));
    }
}
