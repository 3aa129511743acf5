//! The ingress receiver: the single entry point for new messages.
//!
//! The inbound transport (already authenticated, out of scope here) hands
//! over a namespace and raw text; the receiver journals the raw event,
//! writes the message row, queues processing work, and returns. Processing
//! is asynchronous by design, so the caller is never blocked on the agent.
//!
//! Ordering matters: the journal append comes first and must never silently
//! fail. If any step fails the whole call fails and the transport retries;
//! every step is idempotent under the same message key, so retried receives
//! are safe.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{CortexError, Result};
use crate::journal::{DurableJournal, RawEvent};
use crate::model::{Message, MessageKey};
use crate::queue::{WorkItem, WorkQueue};
use crate::store::EntityStore;
use crate::telemetry::metrics;

/// Accepts validated inbound messages and starts the pipeline.
pub struct IngressReceiver {
    store: Arc<dyn EntityStore>,
    journal: Arc<dyn DurableJournal>,
    process_queue: WorkQueue,
    source: String,
}

impl IngressReceiver {
    pub fn new(
        store: Arc<dyn EntityStore>,
        journal: Arc<dyn DurableJournal>,
        process_queue: WorkQueue,
    ) -> Self {
        Self {
            store,
            journal,
            process_queue,
            source: "transport".to_string(),
        }
    }

    /// Label recorded as the event's provenance (e.g. the transport name).
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Accept a message, assigning a fresh key.
    pub async fn receive(&self, namespace: &str, raw_text: &str) -> Result<MessageKey> {
        let key = MessageKey::new(Utc::now(), Uuid::new_v4());
        self.receive_with_key(namespace, raw_text, key).await
    }

    /// Accept a message under a caller-supplied key.
    ///
    /// This is the retry path: a transport that saw a failure calls again
    /// with the same key, and every step below tolerates the repeat.
    pub async fn receive_with_key(
        &self,
        namespace: &str,
        raw_text: &str,
        key: MessageKey,
    ) -> Result<MessageKey> {
        if namespace.trim().is_empty() {
            return Err(CortexError::validation("namespace must not be empty"));
        }
        if raw_text.trim().is_empty() {
            return Err(CortexError::validation("message text must not be empty"));
        }

        // 1. Journal first. Without provenance the message must not exist.
        let event = RawEvent::new(namespace, key.message_id, key.timestamp, raw_text, &self.source);
        let journal_ref = self.journal.append(&event).await?;

        // 2. Message row, status `received`. A repeat receive must not
        // regress a row a worker already advanced.
        if self
            .store
            .get(namespace, &key.sort_key())
            .await?
            .is_none()
        {
            let message = Message::received(namespace, key, raw_text, journal_ref.key.clone());
            self.store.put(&message.into()).await?;
        }

        // 3. Queue processing work. A duplicate item is harmless: the
        // processing worker short-circuits on settled messages.
        self.process_queue
            .enqueue(WorkItem::process(namespace, key))
            .await?;

        metrics::record_message_received(namespace);
        info!(
            namespace = %namespace,
            message_id = %key.message_id,
            journal_key = %journal_ref.key,
            raw_length = raw_text.len(),
            "Message received"
        );

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{InMemoryJournal, JournalRef, TimeRange};
    use crate::model::{EntityRecord, MessageStatus};
    use crate::queue::QueueConfig;
    use crate::store::InMemoryEntityStore;
    use async_trait::async_trait;

    fn receiver() -> (
        Arc<InMemoryEntityStore>,
        Arc<InMemoryJournal>,
        WorkQueue,
        IngressReceiver,
    ) {
        let store = Arc::new(InMemoryEntityStore::new());
        let journal = Arc::new(InMemoryJournal::new());
        let queue = WorkQueue::in_memory(QueueConfig::default());
        let receiver = IngressReceiver::new(store.clone(), journal.clone(), queue.clone())
            .with_source("test");
        (store, journal, queue, receiver)
    }

    #[tokio::test]
    async fn test_receive_journals_stores_and_enqueues() {
        let (store, journal, queue, receiver) = receiver();

        let key = receiver.receive("ns1", "buy milk tomorrow").await.unwrap();

        // Journal has the exact raw event.
        let refs = journal
            .list("ns1", TimeRange::all(), None, 10)
            .await
            .unwrap();
        assert_eq!(refs.len(), 1);
        let event = journal.read_event(&refs[0]).await.unwrap();
        assert_eq!(event.raw_text, "buy milk tomorrow");
        assert_eq!(event.message_id, key.message_id);

        // Message row exists with status `received` and journal provenance.
        let message = store.get_message("ns1", &key).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Received);
        assert_eq!(message.log_reference, refs[0].key);

        // One processing work item queued.
        let lease = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(lease.item.message.message_id, key.message_id);
    }

    #[tokio::test]
    async fn test_journal_round_trip_exact_bytes() {
        let (_, journal, _, receiver) = receiver();
        let text = "remember: \"quotes\", emoji 🎉, and\nnewlines";

        let key = receiver.receive("ns1", text).await.unwrap();

        let reference = JournalRef::new("ns1", key.timestamp, key.message_id);
        let stored = journal.read(&reference).await.unwrap();
        let expected = RawEvent::new("ns1", key.message_id, key.timestamp, text, "test")
            .to_bytes()
            .unwrap();
        assert_eq!(stored, expected);
    }

    #[tokio::test]
    async fn test_retried_receive_is_idempotent() {
        let (store, journal, _, receiver) = receiver();
        let key = MessageKey::new(Utc::now(), Uuid::new_v4());

        receiver
            .receive_with_key("ns1", "buy milk", key)
            .await
            .unwrap();
        receiver
            .receive_with_key("ns1", "buy milk", key)
            .await
            .unwrap();

        assert_eq!(journal.len().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_retry_does_not_regress_advanced_message() {
        let (store, _, _, receiver) = receiver();
        let key = MessageKey::new(Utc::now(), Uuid::new_v4());

        receiver
            .receive_with_key("ns1", "buy milk", key)
            .await
            .unwrap();

        // A worker advances the message between transport retries.
        let mut message = store.get_message("ns1", &key).await.unwrap().unwrap();
        message.transition(MessageStatus::Processing).unwrap();
        store.put(&EntityRecord::from(message)).await.unwrap();

        receiver
            .receive_with_key("ns1", "buy milk", key)
            .await
            .unwrap();

        let message = store.get_message("ns1", &key).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Processing);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let (_, _, _, receiver) = receiver();
        assert!(receiver.receive("ns1", "   ").await.is_err());
        assert!(receiver.receive("", "buy milk").await.is_err());
    }

    #[tokio::test]
    async fn test_journal_failure_fails_the_receive() {
        struct BrokenJournal;

        #[async_trait]
        impl DurableJournal for BrokenJournal {
            async fn append(&self, _event: &RawEvent) -> Result<JournalRef> {
                Err(CortexError::with_internal(
                    crate::error::ErrorCode::JournalAppendFailed,
                    "journal unavailable",
                    "disk full",
                ))
            }

            async fn read(&self, reference: &JournalRef) -> Result<Vec<u8>> {
                Err(CortexError::not_found("journal_record", reference.to_string()))
            }

            async fn list(
                &self,
                _namespace: &str,
                _range: TimeRange,
                _after: Option<&JournalRef>,
                _limit: usize,
            ) -> Result<Vec<JournalRef>> {
                Ok(Vec::new())
            }
        }

        let store = Arc::new(InMemoryEntityStore::new());
        let queue = WorkQueue::in_memory(QueueConfig::default());
        let receiver = IngressReceiver::new(store.clone(), Arc::new(BrokenJournal), queue.clone());

        let err = receiver.receive("ns1", "buy milk").await.unwrap_err();
        assert!(err.is_retryable());

        // Nothing else happened: no row, no work item.
        assert_eq!(store.len().await, 0);
        assert!(queue.dequeue().await.unwrap().is_none());
    }
}
