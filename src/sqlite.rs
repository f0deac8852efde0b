// SQLite snapshot backend

use crate::backend::{Backend, LoadOutcome};
use crate::error::{Result, StoreError};
use crate::models::Task;
use crate::record::{SCHEMA_VERSION, StoredTask, decode_records};
use rusqlite::{Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Stores each task as a JSON row; a save replaces every row in one
/// transaction so readers never see half a snapshot.
pub struct SqliteBackend {
    path: PathBuf,
    db: Connection,
}

impl SqliteBackend {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::persistence(parent, e))?;
        }

        let db = Connection::open(&path).map_err(|e| StoreError::persistence(&path, e))?;
        let backend = Self { path, db };
        backend.create_schema()?;

        Ok(backend)
    }

    fn create_schema(&self) -> Result<()> {
        debug!(path = ?self.path, "Creating database schema");

        self.db
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY,
                owner INTEGER,
                data_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks(owner);

            CREATE TABLE IF NOT EXISTS store_metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
            )
            .map_err(|e| StoreError::persistence(&self.path, e))
    }

    /// Schema version recorded by the last save, if any
    pub fn stored_version(&self) -> Result<Option<u32>> {
        let value: Option<String> = self
            .db
            .query_row("SELECT value FROM store_metadata WHERE key = 'schema_version'", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| StoreError::persistence(&self.path, e))?;

        Ok(value.and_then(|v| v.parse().ok()))
    }

    fn read_rows(&self) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self.db.prepare("SELECT data_json FROM tasks ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect()
    }

    fn write_rows(&self, tasks: &[&Task]) -> rusqlite::Result<()> {
        let tx = self.db.unchecked_transaction()?;

        tx.execute("DELETE FROM tasks", [])?;
        {
            let mut insert =
                tx.prepare("INSERT INTO tasks (id, owner, data_json, updated_at) VALUES (?1, ?2, ?3, ?4)")?;
            for task in tasks {
                let id =
                    i64::try_from(task.id).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                let data_json = serde_json::to_string(&StoredTask::new(task))
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                insert.execute(rusqlite::params![
                    id,
                    task.owner,
                    data_json,
                    task.updated_at.and_utc().timestamp_millis(),
                ])?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO store_metadata (key, value) VALUES ('schema_version', ?1)",
            [SCHEMA_VERSION.to_string()],
        )?;

        tx.commit()
    }
}

impl Backend for SqliteBackend {
    fn load(&self) -> LoadOutcome {
        let rows = match self.read_rows() {
            Ok(rows) => rows,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Failed to read tasks table");
                return LoadOutcome::failed(self.describe(), e.to_string());
            }
        };

        // A row that is not valid JSON becomes a string value, which
        // decode_records then reports as skipped
        let values = rows
            .into_iter()
            .map(|json| serde_json::from_str(&json).unwrap_or(serde_json::Value::String(json)))
            .collect();

        let (tasks, warnings) = decode_records(values);
        info!(path = ?self.path, count = tasks.len(), "Loaded tasks from SQLite");

        LoadOutcome { tasks, warnings }
    }

    fn save(&self, tasks: &[&Task]) -> Result<()> {
        self.write_rows(tasks).map_err(|e| StoreError::persistence(&self.path, e))?;
        debug!(path = ?self.path, count = tasks.len(), "Saved tasks to SQLite");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreWarning;
    use crate::models::{Priority, TaskStatus, normalize_tags, now};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample(id: u64, owner: Option<i64>) -> Task {
        Task {
            id,
            description: format!("Task {}", id),
            status: TaskStatus::Completed,
            priority: Priority::Low,
            tags: normalize_tags(["errands", "home"]),
            due_date: NaiveDate::from_ymd_opt(2025, 6, 30),
            created_at: now(),
            updated_at: now(),
            owner,
        }
    }

    #[test]
    fn test_open_creates_database() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data").join("tasks.db");

        let backend = SqliteBackend::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(backend.stored_version().unwrap(), None);
        assert!(backend.load().tasks.is_empty());
    }

    #[test]
    fn test_save_replaces_snapshot() {
        let temp = TempDir::new().unwrap();
        let backend = SqliteBackend::open(temp.path().join("tasks.db")).unwrap();
        let (a, b, c) = (sample(1, None), sample(2, Some(7)), sample(3, None));

        backend.save(&[&a, &b, &c]).unwrap();
        backend.save(&[&a, &b]).unwrap();

        let outcome = backend.load();
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.tasks.len(), 2);
        assert_eq!(outcome.tasks[&2], b);
        assert_eq!(backend.stored_version().unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_reopen_sees_saved_tasks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.db");
        let task = sample(5, None);

        SqliteBackend::open(&path).unwrap().save(&[&task]).unwrap();
        let outcome = SqliteBackend::open(&path).unwrap().load();

        assert_eq!(outcome.tasks[&5], task);
    }

    #[test]
    fn test_save_rejects_id_beyond_i64() {
        let temp = TempDir::new().unwrap();
        let backend = SqliteBackend::open(temp.path().join("tasks.db")).unwrap();
        backend.save(&[&sample(1, None)]).unwrap();

        let err = backend.save(&[&sample(u64::MAX, None)]).unwrap_err();
        assert!(matches!(err, StoreError::Persistence { .. }));

        // The failed transaction left the previous snapshot alone
        let outcome = backend.load();
        assert_eq!(outcome.tasks.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_corrupt_row_is_skipped() {
        let temp = TempDir::new().unwrap();
        let backend = SqliteBackend::open(temp.path().join("tasks.db")).unwrap();
        backend.save(&[&sample(1, None)]).unwrap();
        backend
            .db
            .execute(
                "INSERT INTO tasks (id, owner, data_json, updated_at) VALUES (2, NULL, '{oops', 0)",
                [],
            )
            .unwrap();

        let outcome = backend.load();
        assert_eq!(outcome.tasks.len(), 1);
        assert!(matches!(outcome.warnings.as_slice(), [StoreWarning::RecordSkipped { .. }]));
    }
}
