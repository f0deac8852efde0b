// Data models for todostore

use crate::error::{Result, StoreError};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Largest assignable id; ids must fit a signed 64-bit SQLite key
pub const MAX_TASK_ID: u64 = i64::MAX as u64;

/// A single todo item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub tags: BTreeSet<String>,
    pub due_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    /// Owning user in multi-user deployments; `None` for console use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<i64>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Case-insensitive substring match on the description or any tag.
    /// `needle` must already be lowercased.
    pub(crate) fn matches_keyword(&self, needle: &str) -> bool {
        self.description.to_lowercase().contains(needle)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(needle))
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = now();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            TaskStatus::Pending => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::Pending,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(StoreError::validation(
                "status",
                format!("'{}' is not one of pending, completed", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Sort weight: ascending order runs low -> high
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(StoreError::validation(
                "priority",
                format!("'{}' is not one of high, medium, low", other),
            )),
        }
    }
}

/// Input for [`crate::TaskStore::add`].
///
/// `priority` and `due_date` are raw text as typed by the user; the store
/// does the parsing so that every entry point applies the same rules.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub description: String,
    pub priority: Option<String>,
    pub tags: Vec<String>,
    pub due_date: Option<String>,
}

impl NewTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn due(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
        self
    }
}

/// Trim every tag and drop the empty ones. Duplicates collapse.
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| tag.as_ref().trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Reject empty or whitespace-only descriptions. The text is kept as given.
pub(crate) fn validate_description(description: &str) -> Result<String> {
    if description.trim().is_empty() {
        return Err(StoreError::validation("description", "cannot be empty"));
    }
    Ok(description.to_string())
}

/// Parse a due date.
///
/// Accepts `YYYY-MM-DD` or an ISO-8601 date-time (with or without offset),
/// in which case only the date part is kept.
pub fn parse_due_date(input: &str) -> Result<NaiveDate> {
    let input = input.trim();

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::from_str(input) {
        return Ok(dt.date());
    }

    Err(StoreError::validation(
        "due_date",
        format!("'{}' is not a date (expected YYYY-MM-DD)", input),
    ))
}

/// Current local time, without offset, as stored in `created_at`/`updated_at`
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parsing() {
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" Low ".parse::<Priority>().unwrap(), Priority::Low);
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().unwrap_err().is_validation());
        assert!("".parse::<Priority>().is_err());
    }

    #[test]
    fn test_priority_rank() {
        assert!(Priority::High.rank() > Priority::Medium.rank());
        assert!(Priority::Medium.rank() > Priority::Low.rank());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");

        let json = serde_json::to_string(&Priority::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
    }

    #[test]
    fn test_status_toggled() {
        assert_eq!(TaskStatus::Pending.toggled(), TaskStatus::Completed);
        assert_eq!(TaskStatus::Completed.toggled(), TaskStatus::Pending);
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(["  work ", "", "work", "Work", "   "]);
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("work"));
        assert!(tags.contains("Work"));
    }

    #[test]
    fn test_parse_due_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(parse_due_date("2025-03-01").unwrap(), expected);
        assert_eq!(parse_due_date("2025-03-01T09:30:00").unwrap(), expected);
        assert_eq!(parse_due_date("2025-03-01T09:30:00+02:00").unwrap(), expected);
    }

    #[test]
    fn test_parse_due_date_rejects_garbage() {
        assert!(parse_due_date("next tuesday").is_err());
        assert!(parse_due_date("2025-02-30").is_err());
        assert!(parse_due_date("").is_err());
    }

    #[test]
    fn test_validate_description() {
        assert!(validate_description("").is_err());
        assert!(validate_description("   ").is_err());
        assert_eq!(validate_description("Buy milk").unwrap(), "Buy milk");
    }

    #[test]
    fn test_keyword_match_on_tag() {
        let task = Task {
            id: 1,
            description: "Quarterly report".to_string(),
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            tags: normalize_tags(["work-project"]),
            due_date: None,
            created_at: now(),
            updated_at: now(),
            owner: None,
        };

        assert!(task.matches_keyword("work"));
        assert!(task.matches_keyword("report"));
        assert!(!task.matches_keyword("home"));
    }
}
