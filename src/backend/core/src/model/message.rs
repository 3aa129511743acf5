//! The raw inbound message and its processing state machine.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{CortexError, Result};

use super::DEFAULT_MESSAGE_RETENTION_SECS;

// ═══════════════════════════════════════════════════════════════════════════════
// Message Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Stage of a message in the processing pipeline.
///
/// Transitions are monotonic: `received → processing → processed|failed`,
/// then independently `→ sent → archived`. Nothing moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Received,
    Processing,
    Processed,
    Failed,
    Sent,
    Archived,
}

impl MessageStatus {
    /// Check whether `self → to` is a legal forward transition.
    pub fn can_transition(&self, to: MessageStatus) -> bool {
        use MessageStatus::*;
        matches!(
            (self, to),
            (Received, Processing)
                | (Processing, Processed)
                | (Processing, Failed)
                | (Processed, Sent)
                | (Failed, Sent)
                | (Sent, Archived)
        )
    }

    /// Whether processing has reached a terminal outcome.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Received | Self::Processing)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
            Self::Sent => "sent",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Message Key
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifies a message within a namespace.
///
/// The receive timestamp is part of the key so message sort keys (and the
/// matching journal records) order chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageKey {
    pub timestamp: DateTime<Utc>,
    pub message_id: Uuid,
}

impl MessageKey {
    pub fn new(timestamp: DateTime<Utc>, message_id: Uuid) -> Self {
        Self {
            timestamp,
            message_id,
        }
    }

    /// Sort key: `message#<timestamp>#<message_id>`.
    pub fn sort_key(&self) -> String {
        format!(
            "message#{}#{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.message_id
        )
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message_id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Message
// ═══════════════════════════════════════════════════════════════════════════════

/// A raw message captured from the user.
///
/// Immutable except for `status` and the fields that record processing
/// outcomes. The canonical copy of the raw content lives in the durable
/// journal at `log_reference`; this row is the mutable pipeline view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub namespace: String,
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,

    /// The message text as submitted.
    pub raw_text: String,

    pub status: MessageStatus,

    /// Journal key of the immutable raw event.
    pub log_reference: String,

    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    /// Failure detail surfaced in the response when status is `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Rendered reply for the dispatcher, set when processing settles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,

    /// Retention horizon after which the row may be expired.
    pub expires_at: DateTime<Utc>,
}

impl Message {
    /// Create a freshly received message.
    pub fn received(
        namespace: impl Into<String>,
        key: MessageKey,
        raw_text: impl Into<String>,
        log_reference: impl Into<String>,
    ) -> Self {
        let created_at = key.timestamp;
        Self {
            namespace: namespace.into(),
            message_id: key.message_id,
            timestamp: key.timestamp,
            raw_text: raw_text.into(),
            status: MessageStatus::Received,
            log_reference: log_reference.into(),
            created_at,
            processed_at: None,
            error_message: None,
            response_text: None,
            expires_at: created_at + Duration::seconds(DEFAULT_MESSAGE_RETENTION_SECS),
        }
    }

    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.timestamp, self.message_id)
    }

    pub fn sort_key(&self) -> String {
        self.key().sort_key()
    }

    /// Secondary index key: messages are queried by status, time-ordered.
    pub fn index_key(&self) -> (String, String) {
        (
            format!("status#{}", self.status),
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        )
    }

    /// Advance the status, enforcing monotonicity.
    pub fn transition(&mut self, to: MessageStatus) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(CortexError::invalid_transition(
                self.status.as_str(),
                to.as_str(),
            ));
        }
        if matches!(to, MessageStatus::Processed | MessageStatus::Failed) {
            self.processed_at = Some(Utc::now());
        }
        self.status = to;
        Ok(())
    }

    /// Record a permanent processing failure.
    pub fn fail(&mut self, detail: impl Into<String>) -> Result<()> {
        self.transition(MessageStatus::Failed)?;
        self.error_message = Some(detail.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        let key = MessageKey::new(Utc::now(), Uuid::new_v4());
        Message::received("ns1", key, "buy milk tomorrow", "ns1/2026/08/06/abc.json")
    }

    #[test]
    fn test_sort_key_orders_by_time() {
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(1);
        let a = MessageKey::new(t1, Uuid::new_v4()).sort_key();
        let b = MessageKey::new(t2, Uuid::new_v4()).sort_key();
        assert!(a < b);
    }

    #[test]
    fn test_forward_transitions() {
        let mut msg = sample();
        msg.transition(MessageStatus::Processing).unwrap();
        msg.transition(MessageStatus::Processed).unwrap();
        assert!(msg.processed_at.is_some());
        msg.transition(MessageStatus::Sent).unwrap();
        msg.transition(MessageStatus::Archived).unwrap();
    }

    #[test]
    fn test_no_backward_transitions() {
        let mut msg = sample();
        msg.transition(MessageStatus::Processing).unwrap();
        msg.transition(MessageStatus::Processed).unwrap();

        assert!(msg.transition(MessageStatus::Processing).is_err());
        assert!(msg.transition(MessageStatus::Received).is_err());
        assert_eq!(msg.status, MessageStatus::Processed);
    }

    #[test]
    fn test_failed_records_detail() {
        let mut msg = sample();
        msg.transition(MessageStatus::Processing).unwrap();
        msg.fail("agent rejected the request").unwrap();
        assert_eq!(msg.status, MessageStatus::Failed);
        assert_eq!(
            msg.error_message.as_deref(),
            Some("agent rejected the request")
        );
    }

    #[test]
    fn test_skipping_processing_is_illegal() {
        let mut msg = sample();
        assert!(msg.transition(MessageStatus::Processed).is_err());
        assert_eq!(msg.status, MessageStatus::Received);
    }

    #[test]
    fn test_index_key_tracks_status() {
        let mut msg = sample();
        assert!(msg.index_key().0.ends_with("received"));
        msg.transition(MessageStatus::Processing).unwrap();
        assert!(msg.index_key().0.ends_with("processing"));
    }
}
