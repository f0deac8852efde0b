// Query predicates, sort keys and paging for task listings

use crate::error::StoreError;
use crate::models::{Priority, Task, TaskStatus};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Conjunction of optional predicates. An unset field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    /// Exact tag membership, not substring
    pub tag: Option<String>,
}

impl TaskFilter {
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.priority.is_none() && self.tag.is_none()
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|status| task.status == status)
            && self.priority.is_none_or(|priority| task.priority == priority)
            && self.tag.as_deref().is_none_or(|tag| task.has_tag(tag))
    }
}

/// Ownership predicate applied before any other filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scope {
    /// Every task, regardless of owner (console mode)
    #[default]
    All,
    /// Only tasks owned by this user
    Owner(i64),
}

impl Scope {
    pub fn contains(&self, task: &Task) -> bool {
        match self {
            Scope::All => true,
            Scope::Owner(owner) => task.owner == Some(*owner),
        }
    }

    pub(crate) fn owner(&self) -> Option<i64> {
        match self {
            Scope::All => None,
            Scope::Owner(owner) => Some(*owner),
        }
    }
}

/// Field to order a listing by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Id,
    Description,
    Priority,
    DueDate,
    Status,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Id => "id",
            SortKey::Description => "description",
            SortKey::Priority => "priority",
            SortKey::DueDate => "due_date",
            SortKey::Status => "status",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "id" => Ok(SortKey::Id),
            "description" => Ok(SortKey::Description),
            "priority" => Ok(SortKey::Priority),
            "due_date" | "due" => Ok(SortKey::DueDate),
            "status" => Ok(SortKey::Status),
            other => Err(StoreError::validation(
                "sort key",
                format!("'{}' is not one of id, description, priority, due_date, status", other),
            )),
        }
    }
}

/// Stable sort of `tasks` by `key`.
///
/// Ties keep their incoming order in both directions. With `key = DueDate`,
/// undated tasks always end up last, even when `reverse` is set.
pub fn sort_tasks(tasks: &mut [&Task], key: SortKey, reverse: bool) {
    let directed = |ord: Ordering| if reverse { ord.reverse() } else { ord };

    match key {
        SortKey::Id => tasks.sort_by(|a, b| directed(a.id.cmp(&b.id))),
        SortKey::Description => {
            // Lowercase each description once, not once per comparison
            let mut keyed: Vec<(String, &Task)> =
                tasks.iter().map(|task| (task.description.to_lowercase(), *task)).collect();
            keyed.sort_by(|a, b| directed(a.0.cmp(&b.0)));
            for (slot, (_, task)) in tasks.iter_mut().zip(keyed) {
                *slot = task;
            }
        }
        SortKey::Priority => tasks.sort_by(|a, b| directed(a.priority.rank().cmp(&b.priority.rank()))),
        SortKey::DueDate => tasks.sort_by(|a, b| match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => directed(x.cmp(&y)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }),
        SortKey::Status => tasks.sort_by(|a, b| directed(a.status.as_str().cmp(b.status.as_str()))),
    }
}

pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Offset/limit window over a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    /// Limit is clamped to `1..=MAX_PAGE_LIMIT`
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.offset).take(self.limit).collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_LIMIT)
    }
}

/// Everything a listing needs: filter, then sort, then page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: TaskFilter,
    pub sort: SortKey,
    pub reverse: bool,
    pub page: Page,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{normalize_tags, now};
    use chrono::NaiveDate;

    fn task(id: u64, description: &str, priority: Priority, due: Option<(i32, u32, u32)>) -> Task {
        Task {
            id,
            description: description.to_string(),
            status: TaskStatus::Pending,
            priority,
            tags: normalize_tags(["home"]),
            due_date: due.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            created_at: now(),
            updated_at: now(),
            owner: None,
        }
    }

    fn ids(tasks: &[&Task]) -> Vec<u64> {
        tasks.iter().map(|t| t.id).collect()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = TaskFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&task(1, "a", Priority::Low, None)));
    }

    #[test]
    fn test_filter_is_conjunction() {
        let mut done = task(1, "done at home", Priority::Low, None);
        done.status = TaskStatus::Completed;
        let pending = task(2, "pending at home", Priority::Low, None);

        let filter = TaskFilter::default().status(TaskStatus::Completed).tag("home");
        assert!(filter.matches(&done));
        assert!(!filter.matches(&pending));

        let filter = TaskFilter::default().status(TaskStatus::Completed).tag("work");
        assert!(!filter.matches(&done));
    }

    #[test]
    fn test_filter_tag_is_exact() {
        let t = task(1, "a", Priority::Low, None);
        assert!(!TaskFilter::default().tag("hom").matches(&t));
        assert!(!TaskFilter::default().tag("Home").matches(&t));
    }

    #[test]
    fn test_scope() {
        let mut t = task(1, "a", Priority::Low, None);
        assert!(Scope::All.contains(&t));
        assert!(!Scope::Owner(5).contains(&t));
        t.owner = Some(5);
        assert!(Scope::Owner(5).contains(&t));
        assert!(!Scope::Owner(6).contains(&t));
    }

    #[test]
    fn test_sort_priority_reverse_is_stable() {
        let tasks = [
            task(1, "a", Priority::Low, None),
            task(2, "b", Priority::High, None),
            task(3, "c", Priority::Medium, None),
            task(4, "d", Priority::High, None),
        ];
        let mut refs: Vec<&Task> = tasks.iter().collect();

        sort_tasks(&mut refs, SortKey::Priority, true);
        assert_eq!(ids(&refs), vec![2, 4, 3, 1]);

        sort_tasks(&mut refs, SortKey::Priority, false);
        assert_eq!(ids(&refs), vec![1, 3, 2, 4]);
    }

    #[test]
    fn test_sort_due_date_undated_last_both_ways() {
        let tasks = [
            task(1, "a", Priority::Low, Some((2025, 3, 1))),
            task(2, "b", Priority::Low, None),
            task(3, "c", Priority::Low, Some((2025, 1, 1))),
        ];
        let mut refs: Vec<&Task> = tasks.iter().collect();

        sort_tasks(&mut refs, SortKey::DueDate, false);
        assert_eq!(ids(&refs), vec![3, 1, 2]);

        sort_tasks(&mut refs, SortKey::DueDate, true);
        assert_eq!(ids(&refs), vec![1, 3, 2]);
    }

    #[test]
    fn test_sort_description_case_insensitive() {
        let tasks = [
            task(1, "banana", Priority::Low, None),
            task(2, "Apple", Priority::Low, None),
            task(3, "cherry", Priority::Low, None),
        ];
        let mut refs: Vec<&Task> = tasks.iter().collect();

        sort_tasks(&mut refs, SortKey::Description, false);
        assert_eq!(ids(&refs), vec![2, 1, 3]);

        sort_tasks(&mut refs, SortKey::Description, true);
        assert_eq!(ids(&refs), vec![3, 1, 2]);
    }

    #[test]
    fn test_sort_description_ties_stable_both_ways() {
        let tasks = [
            task(1, "Milk", Priority::Low, None),
            task(2, "bread", Priority::Low, None),
            task(3, "milk", Priority::Low, None),
            task(4, "MILK", Priority::Low, None),
        ];
        let mut refs: Vec<&Task> = tasks.iter().collect();

        sort_tasks(&mut refs, SortKey::Description, false);
        assert_eq!(ids(&refs), vec![2, 1, 3, 4]);

        let mut refs: Vec<&Task> = tasks.iter().collect();
        sort_tasks(&mut refs, SortKey::Description, true);
        assert_eq!(ids(&refs), vec![1, 3, 4, 2]);
    }

    #[test]
    fn test_sort_key_parsing() {
        assert_eq!("due-date".parse::<SortKey>().unwrap(), SortKey::DueDate);
        assert_eq!("Priority".parse::<SortKey>().unwrap(), SortKey::Priority);
        assert!("size".parse::<SortKey>().is_err());
    }

    #[test]
    fn test_page() {
        let items: Vec<u32> = (1..=10).collect();
        assert_eq!(Page::new(2, 3).apply(items.clone()), vec![3, 4, 5]);
        assert_eq!(Page::new(9, 5).apply(items.clone()), vec![10]);
        assert!(Page::new(20, 5).apply(items).is_empty());
        assert_eq!(Page::new(0, 0).limit, 1);
        assert_eq!(Page::new(0, 5000).limit, MAX_PAGE_LIMIT);
    }
}
