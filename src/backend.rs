// Persistence seam between the in-memory store and its storage

use crate::error::{Result, StoreError, StoreWarning};
use crate::models::Task;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

/// What a backend produced on load
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub tasks: BTreeMap<u64, Task>,
    pub warnings: Vec<StoreWarning>,
}

impl LoadOutcome {
    /// Empty collection, reported as a failed load
    pub fn failed(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tasks: BTreeMap::new(),
            warnings: vec![StoreWarning::LoadFailed {
                location: location.into(),
                reason: reason.into(),
            }],
        }
    }
}

/// Snapshot storage for a task collection.
///
/// `load` never fails on missing or unreadable data: that degrades to an
/// empty collection plus a warning. `save` overwrites the whole snapshot.
pub trait Backend {
    fn load(&self) -> LoadOutcome;

    fn save(&self, tasks: &[&Task]) -> Result<()>;

    /// Human-readable location, for logs and messages
    fn describe(&self) -> String;
}

/// Stand-in for storage that could not be opened at all.
///
/// Loads as an empty collection with the open error as a warning; every
/// save fails with the same error, so each mutation surfaces `SaveFailed`.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    location: String,
    path: PathBuf,
    reason: String,
}

impl UnavailableBackend {
    pub fn new(location: impl Into<String>, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl Backend for UnavailableBackend {
    fn load(&self) -> LoadOutcome {
        LoadOutcome::failed(self.describe(), self.reason.clone())
    }

    fn save(&self, _tasks: &[&Task]) -> Result<()> {
        Err(StoreError::persistence(&self.path, io::Error::other(self.reason.clone())))
    }

    fn describe(&self) -> String {
        self.location.clone()
    }
}
