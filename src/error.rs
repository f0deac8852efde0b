// Error taxonomy for store operations

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by [`crate::TaskStore`] operations.
///
/// Validation and not-found errors are always no-ops: the store is left
/// exactly as it was before the call.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("task {id} not found")]
    NotFound { id: u64 },

    #[error("storage error at {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: PersistenceSource,
    },
}

/// Underlying cause of a [`StoreError::Persistence`].
#[derive(Debug, Error)]
pub enum PersistenceSource {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        StoreError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: impl Into<PersistenceSource>) -> Self {
        StoreError::Persistence {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Non-fatal conditions surfaced to the caller.
///
/// The operation that produced a warning still completed; drain them with
/// [`crate::TaskStore::take_warnings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWarning {
    /// Storage existed but could not be read or parsed; started empty
    LoadFailed { location: String, reason: String },
    /// A persisted record could not be used at all
    RecordSkipped { position: usize, reason: String },
    /// A persisted record held a value that was replaced by its default
    RecordRepaired { id: u64, reason: String },
    /// Two persisted records shared an id; the later one was kept
    DuplicateId { id: u64 },
    /// `add` was given an unknown priority and used medium instead
    PriorityDefaulted { given: String },
    /// The snapshot could not be written; memory still holds the changes
    SaveFailed { reason: String },
}

impl fmt::Display for StoreWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreWarning::LoadFailed { location, reason } => {
                write!(f, "could not load {} ({}); starting with an empty task list", location, reason)
            }
            StoreWarning::RecordSkipped { position, reason } => {
                write!(f, "skipped stored record #{}: {}", position, reason)
            }
            StoreWarning::RecordRepaired { id, reason } => write!(f, "task {}: {}", id, reason),
            StoreWarning::DuplicateId { id } => {
                write!(f, "task id {} appears more than once; kept the last copy", id)
            }
            StoreWarning::PriorityDefaulted { given } => {
                write!(f, "priority '{}' is not one of high, medium, low; using medium", given)
            }
            StoreWarning::SaveFailed { reason } => write!(f, "could not save tasks: {}", reason),
        }
    }
}
