//! Domain records stored in the entity store.
//!
//! All records share a two-part key: a namespace key identifying the owning
//! user, and a sort key whose prefix encodes the record type. One physical
//! store holds every type; range queries per type use the prefix. New record
//! types are added by defining a new prefix, with no schema migration.

use serde::{Deserialize, Serialize};
use std::fmt;

mod message;
mod reminder;
mod task;
mod todo;

pub use message::{Message, MessageKey, MessageStatus};
pub use reminder::{Reminder, ReminderRecurrence, ReminderStatus};
pub use task::{Task, TaskPriority, TaskStatus};
pub use todo::Todo;

use chrono::{DateTime, Utc};

/// Default retention window for message rows (30 days).
pub const DEFAULT_MESSAGE_RETENTION_SECS: i64 = 30 * 24 * 60 * 60;

// ═══════════════════════════════════════════════════════════════════════════════
// Record Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Discriminator for the record types held in the entity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Message,
    Task,
    Todo,
    Reminder,
}

impl ItemType {
    /// Sort-key prefix for this type, including the separator.
    pub const fn sort_prefix(&self) -> &'static str {
        match self {
            Self::Message => "message#",
            Self::Task => "task#",
            Self::Todo => "todo#",
            Self::Reminder => "reminder#",
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Task => "task",
            Self::Todo => "todo",
            Self::Reminder => "reminder",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entity Record
// ═══════════════════════════════════════════════════════════════════════════════

/// A record in the entity store, tagged by type.
///
/// One interface with a type discriminator, not inheritance: the store never
/// needs to know more than the key, the status label, and the index key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityRecord {
    Message(Message),
    Task(Task),
    Todo(Todo),
    Reminder(Reminder),
}

impl EntityRecord {
    /// Namespace key of the owning user.
    pub fn namespace(&self) -> &str {
        match self {
            Self::Message(m) => &m.namespace,
            Self::Task(t) => &t.namespace,
            Self::Todo(t) => &t.namespace,
            Self::Reminder(r) => &r.namespace,
        }
    }

    /// Sort key within the namespace (`<prefix><id...>`).
    pub fn sort_key(&self) -> String {
        match self {
            Self::Message(m) => m.sort_key(),
            Self::Task(t) => t.sort_key(),
            Self::Todo(t) => t.sort_key(),
            Self::Reminder(r) => r.sort_key(),
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Message(_) => ItemType::Message,
            Self::Task(_) => ItemType::Task,
            Self::Todo(_) => ItemType::Todo,
            Self::Reminder(_) => ItemType::Reminder,
        }
    }

    /// Current status label, used by the store's conditional write.
    ///
    /// Todos have no status machine; completion is reported instead.
    pub fn status_label(&self) -> String {
        match self {
            Self::Message(m) => m.status.to_string(),
            Self::Task(t) => t.status.to_string(),
            Self::Todo(t) => if t.completed { "completed" } else { "open" }.to_string(),
            Self::Reminder(r) => r.status.to_string(),
        }
    }

    /// Secondary index key `(partition, sort)`, if this record is indexed.
    pub fn index_key(&self) -> Option<(String, String)> {
        match self {
            Self::Message(m) => Some(m.index_key()),
            Self::Task(t) => Some(t.index_key()),
            Self::Todo(_) => None,
            Self::Reminder(r) => Some(r.index_key()),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Message(m) => m.created_at,
            Self::Task(t) => t.created_at,
            Self::Todo(t) => t.created_at,
            Self::Reminder(r) => r.created_at,
        }
    }

    /// A one-line summary suitable for agent context.
    pub fn summary(&self) -> EntitySummary {
        match self {
            Self::Message(m) => EntitySummary {
                entity_type: ItemType::Message,
                id: m.message_id.to_string(),
                title: m.raw_text.clone(),
                status: m.status.to_string(),
            },
            Self::Task(t) => EntitySummary {
                entity_type: ItemType::Task,
                id: t.task_id.to_string(),
                title: t.title.clone(),
                status: t.status.to_string(),
            },
            Self::Todo(t) => EntitySummary {
                entity_type: ItemType::Todo,
                id: t.todo_id.to_string(),
                title: t.text.clone(),
                status: self.status_label(),
            },
            Self::Reminder(r) => EntitySummary {
                entity_type: ItemType::Reminder,
                id: r.reminder_id.to_string(),
                title: r.title.clone(),
                status: r.status.to_string(),
            },
        }
    }
}

impl From<Message> for EntityRecord {
    fn from(m: Message) -> Self {
        Self::Message(m)
    }
}

impl From<Task> for EntityRecord {
    fn from(t: Task) -> Self {
        Self::Task(t)
    }
}

impl From<Todo> for EntityRecord {
    fn from(t: Todo) -> Self {
        Self::Todo(t)
    }
}

impl From<Reminder> for EntityRecord {
    fn from(r: Reminder) -> Self {
        Self::Reminder(r)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entity Summary
// ═══════════════════════════════════════════════════════════════════════════════

/// Compact record summary passed to the agent capability as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub entity_type: ItemType,
    pub id: String,
    pub title: String,
    pub status: String,
}
