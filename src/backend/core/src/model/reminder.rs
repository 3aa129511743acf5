//! Scheduled notifications with optional recurrence.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Status of a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Dismissed,
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Sent => f.write_str("sent"),
            Self::Dismissed => f.write_str("dismissed"),
        }
    }
}

/// Recurrence pattern for a reminder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderRecurrence {
    #[default]
    Once,
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for ReminderRecurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Once => f.write_str("once"),
            Self::Daily => f.write_str("daily"),
            Self::Weekly => f.write_str("weekly"),
            Self::Monthly => f.write_str("monthly"),
        }
    }
}

/// A scheduled notification extracted from a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub namespace: String,
    pub reminder_id: Uuid,

    pub title: String,

    /// When to notify the user.
    pub scheduled_for: DateTime<Utc>,
    pub recurrence: ReminderRecurrence,

    pub status: ReminderStatus,

    /// Back-reference to the message this was extracted from.
    pub source_message_id: Uuid,

    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl Reminder {
    pub fn new(
        namespace: impl Into<String>,
        title: impl Into<String>,
        scheduled_for: DateTime<Utc>,
        source_message_id: Uuid,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            reminder_id: Uuid::new_v4(),
            title: title.into(),
            scheduled_for,
            recurrence: ReminderRecurrence::default(),
            status: ReminderStatus::Pending,
            source_message_id,
            created_at: Utc::now(),
            sent_at: None,
        }
    }

    pub fn with_recurrence(mut self, recurrence: ReminderRecurrence) -> Self {
        self.recurrence = recurrence;
        self
    }

    /// Sort key: `reminder#<reminder_id>`.
    pub fn sort_key(&self) -> String {
        format!("reminder#{}", self.reminder_id)
    }

    /// Secondary index key: reminders are swept by status, due-time ordered.
    pub fn index_key(&self) -> (String, String) {
        (
            format!("due#{}", self.status),
            self.scheduled_for
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        )
    }

    /// Mark the reminder delivered.
    pub fn mark_sent(&mut self) {
        self.status = ReminderStatus::Sent;
        self.sent_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_reminder_defaults() {
        let when = Utc::now();
        let reminder = Reminder::new("ns1", "stand-up", when, Uuid::new_v4());
        assert_eq!(reminder.status, ReminderStatus::Pending);
        assert_eq!(reminder.recurrence, ReminderRecurrence::Once);
        assert_eq!(reminder.scheduled_for, when);
    }

    #[test]
    fn test_index_key_sorts_by_due_time() {
        let early = Reminder::new("ns1", "a", Utc::now(), Uuid::new_v4());
        let late = Reminder::new(
            "ns1",
            "b",
            Utc::now() + chrono::Duration::hours(1),
            Uuid::new_v4(),
        );
        assert_eq!(early.index_key().0, late.index_key().0);
        assert!(early.index_key().1 < late.index_key().1);
    }

    #[test]
    fn test_mark_sent() {
        let mut reminder = Reminder::new("ns1", "stand-up", Utc::now(), Uuid::new_v4());
        reminder.mark_sent();
        assert_eq!(reminder.status, ReminderStatus::Sent);
        assert!(reminder.sent_at.is_some());
    }
}
