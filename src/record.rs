// Persisted record schema and load-time migration
//
// Version 1 is the first console format: `id`, `description`, `status`,
// and later optional `priority`, `tags`, `due_date`, `created_at`. It carries
// no `schema_version` field. Version 2 adds `updated_at`, `owner` and the
// version tag itself.

use crate::error::StoreWarning;
use crate::models::{MAX_TASK_ID, Priority, Task, TaskStatus, normalize_tags, now};
use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};

pub const SCHEMA_VERSION: u32 = 2;

/// Shape written by the current version
#[derive(Debug, Serialize)]
pub struct StoredTask<'a> {
    pub schema_version: u32,
    #[serde(flatten)]
    pub task: &'a Task,
}

impl<'a> StoredTask<'a> {
    pub fn new(task: &'a Task) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            task,
        }
    }
}

/// Shape accepted on load: any version, every field optional
#[derive(Debug, Default, Deserialize)]
pub struct RawTask {
    pub schema_version: Option<u32>,
    pub id: Option<u64>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub tags: Option<Vec<String>>,
    pub due_date: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub owner: Option<i64>,
}

/// Result of migrating one record
#[derive(Debug)]
pub struct Migrated {
    pub task: Task,
    /// Values that were present but unusable and got replaced
    pub repairs: Vec<String>,
    pub from_version: u32,
}

/// Bring a stored record of any version up to a fully typed [`Task`].
///
/// Missing fields are back-filled with their defaults. Present-but-invalid
/// values are replaced too and reported in `repairs`. Only a missing or
/// out-of-range id or an empty description make the record unusable.
pub fn migrate(raw: RawTask) -> Result<Migrated, String> {
    let from_version = raw.schema_version.unwrap_or(1);
    let id = raw.id.ok_or_else(|| "record has no id".to_string())?;
    if id > MAX_TASK_ID {
        return Err(format!("task id {} is out of range", id));
    }
    let description = raw
        .description
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| format!("task {} has no description", id))?;

    let mut repairs = Vec::new();

    let status = match raw.status.as_deref() {
        None => TaskStatus::default(),
        Some(s) => TaskStatus::from_str(s).unwrap_or_else(|_| {
            repairs.push(format!("unknown status '{}' reset to pending", s));
            TaskStatus::default()
        }),
    };

    let priority = match raw.priority.as_deref() {
        None => Priority::default(),
        Some(p) => Priority::from_str(p).unwrap_or_else(|_| {
            repairs.push(format!("unknown priority '{}' reset to medium", p));
            Priority::default()
        }),
    };

    let tags = normalize_tags(raw.tags.unwrap_or_default());

    // Older versions stored whatever the prompt accepted
    let due_date = match raw.due_date.as_deref() {
        None | Some("") => None,
        Some(d) => match crate::models::parse_due_date(d) {
            Ok(date) => Some(date),
            Err(_) => {
                repairs.push(format!("unreadable due date '{}' dropped", d));
                None
            }
        },
    };

    let created_at = match raw.created_at.as_deref() {
        None => now(),
        Some(ts) => parse_timestamp(ts).unwrap_or_else(|| {
            repairs.push(format!("unreadable created_at '{}' reset to now", ts));
            now()
        }),
    };

    let updated_at = raw
        .updated_at
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(created_at);

    Ok(Migrated {
        task: Task {
            id,
            description,
            status,
            priority,
            tags,
            due_date,
            created_at,
            updated_at,
            owner: raw.owner,
        },
        repairs,
        from_version,
    })
}

/// Decode a list of stored records into tasks keyed by id.
///
/// Records that fail to deserialize or migrate are skipped; duplicate ids
/// keep the last occurrence. Every such event becomes a warning.
pub fn decode_records(values: Vec<serde_json::Value>) -> (BTreeMap<u64, Task>, Vec<StoreWarning>) {
    let mut tasks = BTreeMap::new();
    let mut warnings = Vec::new();
    let mut upgraded = 0usize;

    for (position, value) in values.into_iter().enumerate() {
        let raw: RawTask = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(position, error = %e, "Failed to parse stored task, skipping");
                warnings.push(StoreWarning::RecordSkipped {
                    position,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let migrated = match migrate(raw) {
            Ok(m) => m,
            Err(reason) => {
                warn!(position, %reason, "Unusable stored task, skipping");
                warnings.push(StoreWarning::RecordSkipped { position, reason });
                continue;
            }
        };

        let id = migrated.task.id;
        if migrated.from_version < SCHEMA_VERSION {
            upgraded += 1;
        }
        for reason in migrated.repairs {
            warn!(id, %reason, "Repaired stored task");
            warnings.push(StoreWarning::RecordRepaired { id, reason });
        }
        if tasks.insert(id, migrated.task).is_some() {
            warn!(id, "Duplicate task id in storage");
            warnings.push(StoreWarning::DuplicateId { id });
        }
    }

    if upgraded > 0 {
        debug!(upgraded, to = SCHEMA_VERSION, "Migrated stored tasks");
    }

    (tasks, warnings)
}

fn parse_timestamp(input: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::from_str(input)
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(input)
                .ok()
                .map(|dt| dt.with_timezone(&Local).naive_local())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawTask {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_migrate_v1_backfills_priority_only() {
        let migrated = migrate(raw(json!({
            "id": 3,
            "description": "Water plants",
            "status": "completed",
            "tags": ["home"],
            "due_date": "2025-01-01",
            "created_at": "2024-12-30T08:15:00.123456"
        })))
        .unwrap();

        let task = migrated.task;
        assert_eq!(migrated.from_version, 1);
        assert!(migrated.repairs.is_empty());
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.id, 3);
        assert_eq!(task.description, "Water plants");
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.has_tag("home"));
        assert_eq!(task.due_date.unwrap().to_string(), "2025-01-01");
        assert_eq!(task.created_at.to_string(), "2024-12-30 08:15:00.123456");
        assert_eq!(task.updated_at, task.created_at);
    }

    #[test]
    fn test_migrate_minimal_record() {
        let migrated = migrate(raw(json!({"id": 1, "description": "Oldest"}))).unwrap();

        assert_eq!(migrated.task.status, TaskStatus::Pending);
        assert!(migrated.task.tags.is_empty());
        assert!(migrated.task.due_date.is_none());
        assert!(migrated.task.owner.is_none());
    }

    #[test]
    fn test_migrate_repairs_invalid_values() {
        let migrated = migrate(raw(json!({
            "id": 9,
            "description": "Odd record",
            "priority": "urgent",
            "due_date": "someday"
        })))
        .unwrap();

        assert_eq!(migrated.task.priority, Priority::Medium);
        assert!(migrated.task.due_date.is_none());
        assert_eq!(migrated.repairs.len(), 2);
    }

    #[test]
    fn test_migrate_rejects_missing_id_or_description() {
        assert!(migrate(raw(json!({"description": "No id"}))).is_err());
        assert!(migrate(raw(json!({"id": 2, "description": "  "}))).is_err());
    }

    #[test]
    fn test_migrate_rejects_id_beyond_sqlite_range() {
        assert!(migrate(raw(json!({"id": u64::MAX, "description": "big"}))).is_err());
        assert!(migrate(raw(json!({"id": MAX_TASK_ID + 1, "description": "big"}))).is_err());

        let migrated = migrate(raw(json!({"id": MAX_TASK_ID, "description": "largest"}))).unwrap();
        assert_eq!(migrated.task.id, MAX_TASK_ID);
    }

    #[test]
    fn test_stored_task_carries_version() {
        let task = migrate(raw(json!({"id": 1, "description": "Write"}))).unwrap().task;
        let value = serde_json::to_value(StoredTask::new(&task)).unwrap();

        assert_eq!(value["schema_version"], json!(SCHEMA_VERSION));
        assert_eq!(value["id"], json!(1));
        assert_eq!(value["priority"], json!("medium"));
        assert!(value.get("owner").is_none());

        let again = migrate(serde_json::from_value(value).unwrap()).unwrap();
        assert_eq!(again.from_version, SCHEMA_VERSION);
        assert_eq!(again.task, task);
    }

    #[test]
    fn test_decode_records_skips_and_dedups() {
        let (tasks, warnings) = decode_records(vec![
            json!({"id": 1, "description": "First"}),
            json!("not an object"),
            json!({"id": 1, "description": "First again"}),
            json!({"id": 2, "description": "Second"}),
        ]);

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[&1].description, "First again");
        assert!(warnings.contains(&StoreWarning::DuplicateId { id: 1 }));
        assert!(
            warnings
                .iter()
                .any(|w| matches!(w, StoreWarning::RecordSkipped { position: 1, .. }))
        );
    }
}
