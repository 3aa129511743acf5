//! The external reasoning capability that turns message text into
//! proposed derived entities.
//!
//! The agent is strictly a collaborator behind [`AgentInvoker`]: the
//! pipeline hands it the message text plus summaries of current entities,
//! and gets back a reply and zero or more proposals. Everything about how
//! the agent reasons is out of scope; only the interface and the failure
//! taxonomy matter here.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CortexError, Result};
use crate::model::{
    EntityRecord, EntitySummary, Reminder, ReminderRecurrence, Task, TaskPriority, Todo,
};

mod http;

pub use http::HttpAgentInvoker;

// ═══════════════════════════════════════════════════════════════════════════════
// Proposed Entities
// ═══════════════════════════════════════════════════════════════════════════════

/// A derived entity proposed by the agent, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposedEntity {
    Task {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        due_date: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<TaskPriority>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
    },
    Todo {
        text: String,
        #[serde(default)]
        order: i64,
    },
    Reminder {
        title: String,
        scheduled_for: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recurrence: Option<ReminderRecurrence>,
    },
}

impl ProposedEntity {
    /// Turn the proposal into a store record with a fresh id and the
    /// originating message recorded as a weak back-reference.
    ///
    /// Proposals that fail validation are a permanent error: retrying the
    /// same agent output will not make an empty title valid.
    pub fn materialize(&self, namespace: &str, source_message_id: Uuid) -> Result<EntityRecord> {
        match self {
            Self::Task {
                title,
                description,
                due_date,
                priority,
                category,
            } => {
                let title = non_empty(title, "task title")?;
                let mut task = Task::new(namespace, title, source_message_id);
                if let Some(description) = description {
                    task = task.with_description(description);
                }
                if let Some(due) = due_date {
                    task = task.with_due_date(*due);
                }
                if let Some(priority) = priority {
                    task = task.with_priority(*priority);
                }
                if let Some(category) = category {
                    task = task.with_category(non_empty(category, "task category")?);
                }
                Ok(task.into())
            }
            Self::Todo { text, order } => {
                let text = non_empty(text, "todo text")?;
                Ok(Todo::new(namespace, text, *order, source_message_id).into())
            }
            Self::Reminder {
                title,
                scheduled_for,
                recurrence,
            } => {
                let title = non_empty(title, "reminder title")?;
                let reminder = Reminder::new(namespace, title, *scheduled_for, source_message_id)
                    .with_recurrence(recurrence.unwrap_or_default());
                Ok(reminder.into())
            }
        }
    }

    /// One-line description for the user-facing response.
    pub fn describe(&self) -> String {
        match self {
            Self::Task { title, due_date, .. } => match due_date {
                Some(due) => format!("task \"{}\" (due {})", title.trim(), due),
                None => format!("task \"{}\"", title.trim()),
            },
            Self::Todo { text, .. } => format!("todo \"{}\"", text.trim()),
            Self::Reminder {
                title,
                scheduled_for,
                ..
            } => format!(
                "reminder \"{}\" at {}",
                title.trim(),
                scheduled_for.format("%Y-%m-%d %H:%M UTC")
            ),
        }
    }
}

fn non_empty(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CortexError::agent_response_invalid(format!(
            "{} is empty",
            field
        )));
    }
    Ok(trimmed.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Agent Outcome
// ═══════════════════════════════════════════════════════════════════════════════

/// What the agent returned for one message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    /// Free-text reply summarizing what the agent did.
    #[serde(default)]
    pub reply: String,

    /// Proposed derived entities.
    #[serde(default)]
    pub entities: Vec<ProposedEntity>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Agent Invoker Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for the external reasoning capability.
///
/// Failures carry the standard taxonomy: timeouts, rate limits, and 5xx
/// responses are transient; malformed output is permanent.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Infer proposed entities from a message.
    async fn infer(
        &self,
        message_text: &str,
        context: &[EntitySummary],
    ) -> Result<AgentOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_task_carries_source() {
        let source = Uuid::new_v4();
        let proposal = ProposedEntity::Task {
            title: "buy milk".to_string(),
            description: None,
            due_date: NaiveDate::from_ymd_opt(2026, 8, 7),
            priority: Some(TaskPriority::High),
            category: Some("errands".to_string()),
        };

        let record = proposal.materialize("ns1", source).unwrap();
        let EntityRecord::Task(task) = record else {
            panic!("expected a task");
        };
        assert_eq!(task.title, "buy milk");
        assert_eq!(task.source_message_id, source);
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.category, "errands");
    }

    #[test]
    fn test_materialize_rejects_empty_title() {
        let proposal = ProposedEntity::Task {
            title: "   ".to_string(),
            description: None,
            due_date: None,
            priority: None,
            category: None,
        };
        let err = proposal.materialize("ns1", Uuid::new_v4()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::AgentResponseInvalid);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_materialize_reminder_defaults_to_once() {
        let proposal = ProposedEntity::Reminder {
            title: "stand-up".to_string(),
            scheduled_for: Utc::now(),
            recurrence: None,
        };
        let record = proposal.materialize("ns1", Uuid::new_v4()).unwrap();
        let EntityRecord::Reminder(reminder) = record else {
            panic!("expected a reminder");
        };
        assert_eq!(reminder.recurrence, ReminderRecurrence::Once);
    }

    #[test]
    fn test_proposal_tagged_serialization() {
        let json = serde_json::json!({
            "type": "todo",
            "text": "water the plants"
        });
        let proposal: ProposedEntity = serde_json::from_value(json).unwrap();
        assert_eq!(
            proposal,
            ProposedEntity::Todo {
                text: "water the plants".to_string(),
                order: 0
            }
        );
    }

    #[test]
    fn test_describe_mentions_due_date() {
        let proposal = ProposedEntity::Task {
            title: "buy milk".to_string(),
            description: None,
            due_date: NaiveDate::from_ymd_opt(2026, 8, 7),
            priority: None,
            category: None,
        };
        let text = proposal.describe();
        assert!(text.contains("buy milk"));
        assert!(text.contains("2026-08-07"));
    }
}
