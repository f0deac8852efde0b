// JSON snapshot file backend

use crate::backend::{Backend, LoadOutcome};
use crate::error::{Result, StoreError};
use crate::models::Task;
use crate::record::{StoredTask, decode_records};
use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Stores the whole collection as a pretty-printed JSON array in one file
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

impl Backend for JsonFileBackend {
    fn load(&self) -> LoadOutcome {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?self.path, "No task file yet, starting empty");
                return LoadOutcome::default();
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Failed to read task file");
                return LoadOutcome::failed(self.describe(), e.to_string());
            }
        };

        if content.trim().is_empty() {
            return LoadOutcome::default();
        }

        let values: Vec<serde_json::Value> = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Failed to parse task file");
                return LoadOutcome::failed(self.describe(), e.to_string());
            }
        };

        let (tasks, warnings) = decode_records(values);
        info!(path = ?self.path, count = tasks.len(), "Loaded tasks");

        LoadOutcome { tasks, warnings }
    }

    fn save(&self, tasks: &[&Task]) -> Result<()> {
        let records: Vec<StoredTask> = tasks.iter().map(|t| StoredTask::new(t)).collect();
        let json = serde_json::to_string_pretty(&records).map_err(|e| StoreError::persistence(&self.path, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::persistence(parent, e))?;
        }

        let lock_path = self.sibling(".lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StoreError::persistence(&lock_path, e))?;
        lock.lock_exclusive().map_err(|e| StoreError::persistence(&lock_path, e))?;

        // Write beside the target, then rename over it
        let tmp_path = self.sibling(".tmp");
        let write_tmp = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::persistence(&tmp_path, e));
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::persistence(&self.path, e));
        }

        debug!(path = ?self.path, count = tasks.len(), "Saved tasks");

        // Lock is released when `lock` is dropped
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
