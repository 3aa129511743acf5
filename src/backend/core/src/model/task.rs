//! Actionable tasks derived from messages.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    Archived,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Completed => f.write_str("completed"),
            Self::Archived => f.write_str("archived"),
        }
    }
}

/// Priority level of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Medium => f.write_str("medium"),
            Self::High => f.write_str("high"),
        }
    }
}

/// An actionable task extracted from a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub namespace: String,
    pub task_id: Uuid,

    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub priority: TaskPriority,

    /// Free-form grouping label (work, personal, health...). Categories
    /// evolve over time; new values require no migration.
    pub category: String,

    /// Back-reference to the message this was extracted from. A weak
    /// reference: expiry of the message never cascades here.
    pub source_message_id: Uuid,

    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task with a fresh id.
    pub fn new(
        namespace: impl Into<String>,
        title: impl Into<String>,
        source_message_id: Uuid,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            task_id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            status: TaskStatus::Pending,
            due_date: None,
            priority: TaskPriority::default(),
            category: "general".to_string(),
            source_message_id,
            created_at: Utc::now(),
            updated_at: None,
            completed_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_due_date(mut self, due: NaiveDate) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Sort key: `task#<task_id>`.
    pub fn sort_key(&self) -> String {
        format!("task#{}", self.task_id)
    }

    /// Secondary index key: tasks are queried by category, creation-ordered.
    pub fn index_key(&self) -> (String, String) {
        (
            format!("category#{}", self.category),
            self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        )
    }

    /// Mark the task completed.
    pub fn complete(&mut self) {
        let now = Utc::now();
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_defaults() {
        let source = Uuid::new_v4();
        let task = Task::new("ns1", "buy milk", source);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.category, "general");
        assert_eq!(task.source_message_id, source);
    }

    #[test]
    fn test_builder_fields() {
        let due = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let task = Task::new("ns1", "file taxes", Uuid::new_v4())
            .with_priority(TaskPriority::High)
            .with_category("finance")
            .with_due_date(due)
            .with_description("before the deadline");

        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.due_date, Some(due));
        assert_eq!(task.index_key().0, "category#finance");
    }

    #[test]
    fn test_complete_sets_timestamps() {
        let mut task = Task::new("ns1", "buy milk", Uuid::new_v4());
        task.complete();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
        assert!(task.updated_at.is_some());
    }
}
