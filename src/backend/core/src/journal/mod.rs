//! The append-only durable journal of raw inbound events.
//!
//! Every received message is written here exactly once, before anything
//! else happens to it. Records are immutable and time-ordered per
//! namespace; the journal is the system's source of truth for replay,
//! independent of any mutation later applied to the entity store copy.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::Result;

mod file;
mod memory;

pub use file::FileJournal;
pub use memory::InMemoryJournal;

// ═══════════════════════════════════════════════════════════════════════════════
// Journal Reference
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable reference to one journal record.
///
/// The key is `<timestamp>#<message_id>`, so references within a namespace
/// sort chronologically and a listing can resume after any reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JournalRef {
    pub namespace: String,
    pub key: String,
}

impl JournalRef {
    pub fn new(namespace: impl Into<String>, timestamp: DateTime<Utc>, message_id: Uuid) -> Self {
        Self {
            namespace: namespace.into(),
            key: format!(
                "{}#{}",
                timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                message_id
            ),
        }
    }

    pub fn from_key(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for JournalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.key)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Raw Event
// ═══════════════════════════════════════════════════════════════════════════════

/// The immutable raw event recorded at ingress.
///
/// This is the canonical input for replay; the JSON serialization of this
/// struct is the exact byte payload stored in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub namespace: String,
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub raw_text: String,

    /// Transport that delivered the message (for provenance only).
    pub source: String,
}

impl RawEvent {
    pub fn new(
        namespace: impl Into<String>,
        message_id: Uuid,
        timestamp: DateTime<Utc>,
        raw_text: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            message_id,
            timestamp,
            raw_text: raw_text.into(),
            source: source.into(),
        }
    }

    pub fn journal_ref(&self) -> JournalRef {
        JournalRef::new(&self.namespace, self.timestamp, self.message_id)
    }

    /// Canonical payload bytes for this event.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Time Range
// ═══════════════════════════════════════════════════════════════════════════════

/// Half-open time window for listings: `start <= t < end`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if t < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if t >= end {
                return false;
            }
        }
        true
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Durable Journal Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for journal backends.
///
/// Once `append` returns, the record is durable and will appear in every
/// subsequent listing. There is no update and no delete.
#[async_trait]
pub trait DurableJournal: Send + Sync {
    /// Append a raw event, returning its stable reference.
    ///
    /// Idempotent under retry: re-appending the same key with identical
    /// content succeeds; differing content for an existing key is a
    /// `JournalRecordImmutable` error.
    async fn append(&self, event: &RawEvent) -> Result<JournalRef>;

    /// Read back the exact bytes stored for a reference.
    async fn read(&self, reference: &JournalRef) -> Result<Vec<u8>>;

    /// List references in ascending time order.
    ///
    /// Restartable: passing the last reference of the previous page as
    /// `after` resumes strictly after it.
    async fn list(
        &self,
        namespace: &str,
        range: TimeRange,
        after: Option<&JournalRef>,
        limit: usize,
    ) -> Result<Vec<JournalRef>>;

    /// Read and decode one event.
    async fn read_event(&self, reference: &JournalRef) -> Result<RawEvent> {
        let bytes = self.read(reference).await?;
        RawEvent::from_bytes(&bytes)
    }
}

/// Parse the timestamp component out of a journal key.
pub(crate) fn key_timestamp(key: &str) -> Option<DateTime<Utc>> {
    let (ts, _) = key.split_once('#')?;
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refs_sort_chronologically() {
        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::microseconds(1);
        let a = JournalRef::new("ns1", t1, Uuid::new_v4());
        let b = JournalRef::new("ns1", t2, Uuid::new_v4());
        assert!(a.key < b.key);
    }

    #[test]
    fn test_key_timestamp_round_trip() {
        let now = Utc::now();
        let reference = JournalRef::new("ns1", now, Uuid::new_v4());
        let parsed = key_timestamp(&reference.key).unwrap();
        // Micros precision in the key.
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_raw_event_byte_round_trip() {
        let event = RawEvent::new("ns1", Uuid::new_v4(), Utc::now(), "buy milk", "webhook");
        let bytes = event.to_bytes().unwrap();
        let back = RawEvent::from_bytes(&bytes).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_time_range_half_open() {
        let start = Utc::now();
        let end = start + chrono::Duration::hours(1);
        let range = TimeRange::between(start, end);
        assert!(range.contains(start));
        assert!(!range.contains(end));
        assert!(range.contains(start + chrono::Duration::minutes(30)));
    }
}
