// todostore - Todo task store with search, filtering and sorting over JSON or SQLite

pub mod backend;
pub mod config;
pub mod error;
pub mod filter;
pub mod models;
pub mod record;
pub mod snapshot;
pub mod sqlite;
pub mod store;

// Re-export main types for convenience
pub use backend::{Backend, LoadOutcome, UnavailableBackend};
pub use config::{BackendKind, Config};
pub use error::{Result, StoreError, StoreWarning};
pub use filter::{ListQuery, Page, Scope, SortKey, TaskFilter};
pub use models::{NewTask, Priority, Task, TaskStatus};
pub use snapshot::JsonFileBackend;
pub use sqlite::SqliteBackend;
pub use store::{ScopedTasks, TaskStore};
