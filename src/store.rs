// Task store: in-memory collection indexed by id, persisted as a snapshot

use crate::backend::{Backend, UnavailableBackend};
use crate::error::{Result, StoreError, StoreWarning};
use crate::filter::{ListQuery, Scope, SortKey, TaskFilter, sort_tasks};
use crate::models::{
    MAX_TASK_ID, NewTask, Priority, Task, TaskStatus, normalize_tags, now, parse_due_date, validate_description,
};
use crate::snapshot::JsonFileBackend;
use crate::sqlite::SqliteBackend;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Owns the task collection and every operation on it.
///
/// Tasks live in memory keyed by id. Every mutation is followed by a full
/// snapshot save through the [`Backend`]; a failed save is reported as a
/// [`StoreWarning::SaveFailed`] and the in-memory state stays authoritative.
///
/// Collection order is ascending id, which is insertion order because ids
/// are never reused.
pub struct TaskStore {
    backend: Box<dyn Backend>,
    tasks: BTreeMap<u64, Task>,
    next_id: u64,
    warnings: Vec<StoreWarning>,
}

impl TaskStore {
    /// Load the collection from `backend`.
    ///
    /// Never fails: unreadable storage yields an empty store and a warning.
    pub fn open(backend: impl Backend + 'static) -> Self {
        let outcome = backend.load();
        let next_id = outcome.tasks.keys().next_back().map_or(1, |max| max.saturating_add(1));

        info!(
            backend = %backend.describe(),
            count = outcome.tasks.len(),
            warnings = outcome.warnings.len(),
            "Opened task store"
        );

        Self {
            backend: Box::new(backend),
            tasks: outcome.tasks,
            next_id,
            warnings: outcome.warnings,
        }
    }

    /// Open a store over a JSON snapshot file
    pub fn open_json<P: AsRef<Path>>(path: P) -> Self {
        Self::open(JsonFileBackend::new(path))
    }

    /// Open a store over a SQLite database.
    ///
    /// A database that cannot be opened degrades like an unreadable JSON
    /// file: the store starts empty with a `LoadFailed` warning, and later
    /// saves report `SaveFailed`.
    pub fn open_sqlite<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match SqliteBackend::open(path) {
            Ok(backend) => Self::open(backend),
            Err(e) => {
                error!(path = ?path, error = %e, "Failed to open SQLite database");
                Self::open(UnavailableBackend::new(
                    format!("sqlite:{}", path.display()),
                    path,
                    e.to_string(),
                ))
            }
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Id the next `add` will assign
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn warnings(&self) -> &[StoreWarning] {
        &self.warnings
    }

    /// Drain the warnings gathered since the last call
    pub fn take_warnings(&mut self) -> Vec<StoreWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Write the whole collection to the backend
    pub fn save(&self) -> Result<()> {
        let tasks: Vec<&Task> = self.tasks.values().collect();
        self.backend.save(&tasks)
    }

    /// View restricted to one owner's tasks
    pub fn scoped(&mut self, owner: i64) -> ScopedTasks<'_> {
        ScopedTasks {
            store: self,
            scope: Scope::Owner(owner),
        }
    }

    // ========================================================================
    // Operations over every task
    // ========================================================================

    /// Create a task and return its id.
    ///
    /// An unknown priority falls back to medium with a warning rather than
    /// failing; an empty description or unparseable due date is rejected.
    pub fn add(&mut self, new: NewTask) -> Result<u64> {
        self.add_in(Scope::All, new)
    }

    pub fn find_by_id(&self, id: u64) -> Option<&Task> {
        self.find_in(Scope::All, id)
    }

    /// Every task in collection order
    pub fn all(&self) -> Vec<&Task> {
        self.visible(Scope::All).collect()
    }

    pub fn update_description(&mut self, id: u64, description: &str) -> Result<()> {
        self.update_description_in(Scope::All, id, description)
    }

    pub fn delete(&mut self, id: u64) -> Result<Task> {
        self.delete_in(Scope::All, id)
    }

    /// Idempotent: completing a completed task is not an error
    pub fn mark_complete(&mut self, id: u64) -> Result<()> {
        self.set_status_in(Scope::All, id, TaskStatus::Completed)
    }

    pub fn set_status(&mut self, id: u64, status: TaskStatus) -> Result<()> {
        self.set_status_in(Scope::All, id, status)
    }

    /// Flip pending <-> completed and return the new status
    pub fn toggle_status(&mut self, id: u64) -> Result<TaskStatus> {
        self.toggle_status_in(Scope::All, id)
    }

    pub fn set_priority(&mut self, id: u64, priority: &str) -> Result<()> {
        self.set_priority_in(Scope::All, id, priority)
    }

    pub fn add_tags<S: AsRef<str>>(&mut self, id: u64, tags: &[S]) -> Result<()> {
        self.add_tags_in(Scope::All, id, tags)
    }

    pub fn remove_tags<S: AsRef<str>>(&mut self, id: u64, tags: &[S]) -> Result<()> {
        self.remove_tags_in(Scope::All, id, tags)
    }

    /// Replace the whole tag set in one save; an empty slice clears it
    pub fn set_tags<S: AsRef<str>>(&mut self, id: u64, tags: &[S]) -> Result<()> {
        self.set_tags_in(Scope::All, id, tags)
    }

    pub fn set_due_date(&mut self, id: u64, due_date: &str) -> Result<()> {
        self.set_due_date_in(Scope::All, id, due_date)
    }

    pub fn clear_due_date(&mut self, id: u64) -> Result<()> {
        self.clear_due_date_in(Scope::All, id)
    }

    /// Case-insensitive substring match on description or any tag
    pub fn search(&self, keyword: &str) -> Vec<&Task> {
        self.search_in(Scope::All, keyword)
    }

    pub fn filter(&self, filter: &TaskFilter) -> Vec<&Task> {
        self.filter_in(Scope::All, filter)
    }

    /// Sorted copy of the collection; the collection itself is untouched
    pub fn sort(&self, key: SortKey, reverse: bool) -> Vec<&Task> {
        self.sort_in(Scope::All, key, reverse)
    }

    pub fn list(&self, query: &ListQuery) -> Vec<&Task> {
        self.list_in(Scope::All, query)
    }

    // ========================================================================
    // Scoped implementations
    // ========================================================================

    fn visible(&self, scope: Scope) -> impl Iterator<Item = &Task> {
        self.tasks.values().filter(move |task| scope.contains(task))
    }

    fn find_in(&self, scope: Scope, id: u64) -> Option<&Task> {
        self.tasks.get(&id).filter(|task| scope.contains(task))
    }

    fn add_in(&mut self, scope: Scope, new: NewTask) -> Result<u64> {
        let description = validate_description(&new.description)?;
        if self.next_id > MAX_TASK_ID {
            return Err(StoreError::validation("id", "no task ids left to assign"));
        }

        let due_date = match new.due_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(given) => Some(parse_due_date(given)?),
        };

        let priority = match new.priority.as_deref().map(str::trim) {
            None | Some("") => Priority::default(),
            Some(given) => given.parse::<Priority>().unwrap_or_else(|_| {
                warn!(given, "Unknown priority, using medium");
                self.warnings.push(StoreWarning::PriorityDefaulted {
                    given: given.to_string(),
                });
                Priority::Medium
            }),
        };

        let id = self.next_id;
        self.next_id += 1;

        let created_at = now();
        let task = Task {
            id,
            description,
            status: TaskStatus::Pending,
            priority,
            tags: normalize_tags(&new.tags),
            due_date,
            created_at,
            updated_at: created_at,
            owner: scope.owner(),
        };

        debug!(id, ?scope, "Adding task");
        self.tasks.insert(id, task);
        self.persist();

        Ok(id)
    }

    /// Apply `change` to one task, then persist.
    ///
    /// `updated_at` only moves when the task actually changed, so repeated
    /// idempotent calls leave the record identical.
    fn modify_in<F, R>(&mut self, scope: Scope, id: u64, change: F) -> Result<R>
    where
        F: FnOnce(&mut Task) -> R,
    {
        let task = self
            .tasks
            .get_mut(&id)
            .filter(|task| scope.contains(task))
            .ok_or(StoreError::NotFound { id })?;

        let before = task.clone();
        let output = change(&mut *task);
        if *task != before {
            task.touch();
            debug!(id, "Task modified");
        }

        self.persist();
        Ok(output)
    }

    fn update_description_in(&mut self, scope: Scope, id: u64, description: &str) -> Result<()> {
        let description = validate_description(description)?;
        self.modify_in(scope, id, |task| task.description = description)
    }

    fn delete_in(&mut self, scope: Scope, id: u64) -> Result<Task> {
        if self.find_in(scope, id).is_none() {
            return Err(StoreError::NotFound { id });
        }
        let task = self.tasks.remove(&id).ok_or(StoreError::NotFound { id })?;

        debug!(id, "Deleted task");
        self.persist();
        Ok(task)
    }

    fn set_status_in(&mut self, scope: Scope, id: u64, status: TaskStatus) -> Result<()> {
        self.modify_in(scope, id, |task| task.status = status)
    }

    fn toggle_status_in(&mut self, scope: Scope, id: u64) -> Result<TaskStatus> {
        self.modify_in(scope, id, |task| {
            task.status = task.status.toggled();
            task.status
        })
    }

    fn set_priority_in(&mut self, scope: Scope, id: u64, priority: &str) -> Result<()> {
        let priority: Priority = priority.parse()?;
        self.modify_in(scope, id, |task| task.priority = priority)
    }

    fn add_tags_in<S: AsRef<str>>(&mut self, scope: Scope, id: u64, tags: &[S]) -> Result<()> {
        let tags = normalize_tags(tags);
        self.modify_in(scope, id, |task| task.tags.extend(tags))
    }

    fn remove_tags_in<S: AsRef<str>>(&mut self, scope: Scope, id: u64, tags: &[S]) -> Result<()> {
        let tags = normalize_tags(tags);
        self.modify_in(scope, id, |task| task.tags.retain(|tag| !tags.contains(tag)))
    }

    fn set_tags_in<S: AsRef<str>>(&mut self, scope: Scope, id: u64, tags: &[S]) -> Result<()> {
        let tags = normalize_tags(tags);
        self.modify_in(scope, id, |task| task.tags = tags)
    }

    fn set_due_date_in(&mut self, scope: Scope, id: u64, due_date: &str) -> Result<()> {
        let due_date = parse_due_date(due_date)?;
        self.modify_in(scope, id, |task| task.due_date = Some(due_date))
    }

    fn clear_due_date_in(&mut self, scope: Scope, id: u64) -> Result<()> {
        self.modify_in(scope, id, |task| task.due_date = None)
    }

    fn search_in(&self, scope: Scope, keyword: &str) -> Vec<&Task> {
        let needle = keyword.to_lowercase();
        self.visible(scope).filter(|task| task.matches_keyword(&needle)).collect()
    }

    fn filter_in(&self, scope: Scope, filter: &TaskFilter) -> Vec<&Task> {
        self.visible(scope).filter(|task| filter.matches(task)).collect()
    }

    fn sort_in(&self, scope: Scope, key: SortKey, reverse: bool) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.visible(scope).collect();
        sort_tasks(&mut tasks, key, reverse);
        tasks
    }

    fn list_in(&self, scope: Scope, query: &ListQuery) -> Vec<&Task> {
        let mut tasks = self.filter_in(scope, &query.filter);
        sort_tasks(&mut tasks, query.sort, query.reverse);
        query.page.apply(tasks)
    }

    fn persist(&mut self) {
        if let Err(e) = self.save() {
            error!(backend = %self.backend.describe(), error = %e, "Failed to save tasks");
            self.warnings.push(StoreWarning::SaveFailed { reason: e.to_string() });
        }
    }
}

/// One owner's view of a [`TaskStore`].
///
/// The owner predicate is applied before anything else: other owners' tasks
/// are invisible to queries and report not-found to id-addressed operations.
/// New tasks are stamped with the owner.
pub struct ScopedTasks<'a> {
    store: &'a mut TaskStore,
    scope: Scope,
}

impl ScopedTasks<'_> {
    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn add(&mut self, new: NewTask) -> Result<u64> {
        self.store.add_in(self.scope, new)
    }

    pub fn find_by_id(&self, id: u64) -> Option<&Task> {
        self.store.find_in(self.scope, id)
    }

    pub fn all(&self) -> Vec<&Task> {
        self.store.visible(self.scope).collect()
    }

    pub fn update_description(&mut self, id: u64, description: &str) -> Result<()> {
        self.store.update_description_in(self.scope, id, description)
    }

    pub fn delete(&mut self, id: u64) -> Result<Task> {
        self.store.delete_in(self.scope, id)
    }

    pub fn mark_complete(&mut self, id: u64) -> Result<()> {
        self.store.set_status_in(self.scope, id, TaskStatus::Completed)
    }

    pub fn set_status(&mut self, id: u64, status: TaskStatus) -> Result<()> {
        self.store.set_status_in(self.scope, id, status)
    }

    pub fn toggle_status(&mut self, id: u64) -> Result<TaskStatus> {
        self.store.toggle_status_in(self.scope, id)
    }

    pub fn set_priority(&mut self, id: u64, priority: &str) -> Result<()> {
        self.store.set_priority_in(self.scope, id, priority)
    }

    pub fn add_tags<S: AsRef<str>>(&mut self, id: u64, tags: &[S]) -> Result<()> {
        self.store.add_tags_in(self.scope, id, tags)
    }

    pub fn remove_tags<S: AsRef<str>>(&mut self, id: u64, tags: &[S]) -> Result<()> {
        self.store.remove_tags_in(self.scope, id, tags)
    }

    pub fn set_tags<S: AsRef<str>>(&mut self, id: u64, tags: &[S]) -> Result<()> {
        self.store.set_tags_in(self.scope, id, tags)
    }

    pub fn set_due_date(&mut self, id: u64, due_date: &str) -> Result<()> {
        self.store.set_due_date_in(self.scope, id, due_date)
    }

    pub fn clear_due_date(&mut self, id: u64) -> Result<()> {
        self.store.clear_due_date_in(self.scope, id)
    }

    pub fn search(&self, keyword: &str) -> Vec<&Task> {
        self.store.search_in(self.scope, keyword)
    }

    pub fn filter(&self, filter: &TaskFilter) -> Vec<&Task> {
        self.store.filter_in(self.scope, filter)
    }

    pub fn sort(&self, key: SortKey, reverse: bool) -> Vec<&Task> {
        self.store.sort_in(self.scope, key, reverse)
    }

    pub fn list(&self, query: &ListQuery) -> Vec<&Task> {
        self.store.list_in(self.scope, query)
    }
}
