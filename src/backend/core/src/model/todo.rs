//! Simple list items without deadline structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A simple todo list entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub namespace: String,
    pub todo_id: Uuid,

    pub text: String,
    pub completed: bool,

    /// Position in the list.
    pub order: i64,

    /// Back-reference to the message this was extracted from.
    pub source_message_id: Uuid,

    pub created_at: DateTime<Utc>,
}

impl Todo {
    pub fn new(
        namespace: impl Into<String>,
        text: impl Into<String>,
        order: i64,
        source_message_id: Uuid,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            todo_id: Uuid::new_v4(),
            text: text.into(),
            completed: false,
            order,
            source_message_id,
            created_at: Utc::now(),
        }
    }

    /// Sort key: `todo#<todo_id>`.
    pub fn sort_key(&self) -> String {
        format!("todo#{}", self.todo_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_todo() {
        let todo = Todo::new("ns1", "water the plants", 3, Uuid::new_v4());
        assert!(!todo.completed);
        assert_eq!(todo.order, 3);
        assert!(todo.sort_key().starts_with("todo#"));
    }
}
