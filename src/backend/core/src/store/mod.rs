//! The keyed entity store.
//!
//! One logical namespace-keyed store holds every record type (messages,
//! tasks, todos, reminders) behind a uniform sort-key convention, with a
//! secondary index for cross-cutting queries (by status, by category).
//!
//! The store's conditional write (`put_if_status`) is the only concurrency
//! control primitive in the pipeline: a worker transitioning a record states
//! the status it expects to replace, and a `ConflictingUpdate` error means
//! another worker already advanced the record, so the caller abandons its
//! own transition. There is no lock manager.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{CortexError, Result};
use crate::model::{EntityRecord, ItemType, Message, MessageKey};

mod memory;
mod postgres;

pub use memory::InMemoryEntityStore;
pub use postgres::PostgresEntityStore;

/// Default page size for queries.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

// ═══════════════════════════════════════════════════════════════════════════════
// Query Page
// ═══════════════════════════════════════════════════════════════════════════════

/// One page of query results.
///
/// `next` is an opaque cursor; passing it back as `after` resumes the
/// sequence exactly where this page ended, so interrupted scans (including
/// replay) can restart from any point.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub items: Vec<EntityRecord>,
    pub next: Option<String>,
}

impl QueryPage {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entity Store Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for entity store backends.
///
/// Writes are visible to subsequent reads from the same caller; there is no
/// read-your-own-write staleness.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert or replace a record unconditionally.
    async fn put(&self, record: &EntityRecord) -> Result<()>;

    /// Replace a record only if its stored status matches `expected_status`.
    ///
    /// Fails with `ConflictingUpdate` when the stored status differs or the
    /// record is absent. Callers treat a conflict as "someone else already
    /// advanced this record" and abandon the transition.
    async fn put_if_status(&self, record: &EntityRecord, expected_status: &str) -> Result<()>;

    /// Get a record by its full key.
    async fn get(&self, namespace: &str, sort_key: &str) -> Result<Option<EntityRecord>>;

    /// Query records of one type within a namespace, ascending by sort key.
    async fn query_prefix(
        &self,
        namespace: &str,
        item_type: ItemType,
        after: Option<&str>,
        limit: usize,
    ) -> Result<QueryPage>;

    /// Query the secondary index, ascending by index sort key.
    async fn query_index(
        &self,
        index_partition: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<QueryPage>;

    /// Delete expired message rows. Returns the number removed.
    ///
    /// The only physical deletion in the store; everything else retires via
    /// a terminal status.
    async fn purge_expired(&self, namespace: &str, now: DateTime<Utc>) -> Result<u64>;

    /// Insert or replace several records.
    async fn put_many(&self, records: &[EntityRecord]) -> Result<()> {
        for record in records {
            self.put(record).await?;
        }
        Ok(())
    }

    /// Get a message row by its key.
    async fn get_message(&self, namespace: &str, key: &MessageKey) -> Result<Option<Message>> {
        match self.get(namespace, &key.sort_key()).await? {
            Some(EntityRecord::Message(message)) => Ok(Some(message)),
            Some(other) => Err(CortexError::internal(format!(
                "record at {} is a {}, expected a message",
                key.sort_key(),
                other.item_type()
            ))),
            None => Ok(None),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Index Cursor Encoding
// ═══════════════════════════════════════════════════════════════════════════════

/// Separator for composite index cursors (`index_sk` + record sort key).
///
/// The record sort key disambiguates entries that share an index sort value.
pub(crate) const CURSOR_SEP: char = '\u{1f}';

pub(crate) fn encode_index_cursor(index_sk: &str, sort_key: &str) -> String {
    format!("{}{}{}", index_sk, CURSOR_SEP, sort_key)
}

pub(crate) fn decode_index_cursor(cursor: &str) -> (String, String) {
    match cursor.split_once(CURSOR_SEP) {
        Some((sk, record)) => (sk.to_string(), record.to_string()),
        None => (cursor.to_string(), String::new()),
    }
}
