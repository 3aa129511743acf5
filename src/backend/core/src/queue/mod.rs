//! Durable work queue with lease-based, at-least-once delivery.
//!
//! Work items reference pending processing work by message key. A consumer
//! leases an item for a visibility window; acking within the window removes
//! the item permanently, letting the window lapse makes the item reappear
//! for redelivery. Every delivery increments a per-item receive counter, and
//! an item whose counter reaches the configured maximum is parked in the
//! dead-letter queue instead of being redelivered.
//!
//! Consumers must treat processing as idempotent: the same item may be
//! delivered more than once, and no ordering is guaranteed across
//! concurrent consumers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::model::MessageKey;

mod memory;
mod redis;

pub use memory::InMemoryQueueBackend;
pub use redis::RedisQueueBackend;

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for the work queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How long a leased item stays invisible before redelivery.
    #[serde(with = "humantime_serde")]
    pub visibility_timeout: Duration,

    /// Deliveries after which an item is parked in the dead-letter queue.
    pub max_receive_count: u32,

    /// Sleep between polls when the queue is empty.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(60),
            max_receive_count: 3,
            poll_interval: Duration::from_millis(500),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Work Items
// ═══════════════════════════════════════════════════════════════════════════════

/// What a work item asks a consumer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    /// Run the message through the processing worker.
    Process,
    /// Deliver the message's outcome to the user.
    Respond,
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => f.write_str("process"),
            Self::Respond => f.write_str("respond"),
        }
    }
}

/// A reference to pending work on one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub item_id: Uuid,
    pub kind: WorkKind,
    pub namespace: String,
    pub message: MessageKey,
    pub enqueued_at: DateTime<Utc>,

    /// Deliveries so far, including the current one.
    pub receive_count: u32,
}

impl WorkItem {
    fn new(kind: WorkKind, namespace: impl Into<String>, message: MessageKey) -> Self {
        Self {
            item_id: Uuid::new_v4(),
            kind,
            namespace: namespace.into(),
            message,
            enqueued_at: Utc::now(),
            receive_count: 0,
        }
    }

    /// A processing work item for a freshly received message.
    pub fn process(namespace: impl Into<String>, message: MessageKey) -> Self {
        Self::new(WorkKind::Process, namespace, message)
    }

    /// A response work item for a settled message.
    pub fn respond(namespace: impl Into<String>, message: MessageKey) -> Self {
        Self::new(WorkKind::Respond, namespace, message)
    }
}

/// Temporary ownership of a dequeued work item.
///
/// Dropping a lease without acking is not an error; the item simply
/// reappears once the visibility window lapses.
#[derive(Debug, Clone)]
pub struct Lease {
    pub item: WorkItem,
    pub token: Uuid,
    pub deadline: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════════════

/// Queue statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Items ready for delivery
    pub ready: usize,
    /// Items currently leased
    pub in_flight: usize,
    /// Items parked in the dead-letter queue
    pub dead_letter: usize,
    /// Total items acked (removed permanently)
    pub acked: u64,
    /// Total redeliveries after lease expiry
    pub redelivered: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Queue Backend Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for queue backends.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Enqueue a work item.
    async fn enqueue(&self, item: WorkItem) -> Result<()>;

    /// Attempt to lease the next item. Returns `None` when nothing is ready.
    ///
    /// Implementations reap expired leases first, so redeliveries and
    /// dead-letter parking happen on the dequeue path.
    async fn dequeue(&self) -> Result<Option<Lease>>;

    /// Permanently remove a leased item.
    ///
    /// Acking after the lease expired is a no-op: the item may already have
    /// been redelivered, which is exactly the at-least-once contract.
    async fn ack(&self, lease: &Lease) -> Result<()>;

    /// Get queue statistics.
    async fn stats(&self) -> Result<QueueStats>;

    /// Inspect the dead-letter queue without consuming it.
    async fn dead_letters(&self) -> Result<Vec<WorkItem>>;

    /// Move every dead-lettered item back to the ready queue with a reset
    /// receive counter. Returns the number redriven.
    async fn redrive_dead_letters(&self) -> Result<u64>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Work Queue
// ═══════════════════════════════════════════════════════════════════════════════

/// The main work queue, wrapping a backend with blocking-poll dequeue.
#[derive(Clone)]
pub struct WorkQueue {
    backend: Arc<dyn QueueBackend>,
    poll_interval: Duration,
}

impl WorkQueue {
    /// Create a new work queue over the given backend.
    pub fn new(backend: Arc<dyn QueueBackend>, config: &QueueConfig) -> Self {
        Self {
            backend,
            poll_interval: config.poll_interval,
        }
    }

    /// Create an in-memory work queue (for tests, development, and replay).
    pub fn in_memory(config: QueueConfig) -> Self {
        let poll_interval = config.poll_interval;
        Self {
            backend: Arc::new(InMemoryQueueBackend::new(config)),
            poll_interval,
        }
    }

    pub async fn enqueue(&self, item: WorkItem) -> Result<()> {
        self.backend.enqueue(item).await
    }

    /// Single dequeue attempt.
    pub async fn dequeue(&self) -> Result<Option<Lease>> {
        self.backend.dequeue().await
    }

    /// Dequeue, polling until an item is available or `timeout` elapses.
    pub async fn dequeue_wait(&self, timeout: Duration) -> Result<Option<Lease>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(lease) = self.backend.dequeue().await? {
                return Ok(Some(lease));
            }
            if tokio::time::Instant::now() + self.poll_interval > deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub async fn ack(&self, lease: &Lease) -> Result<()> {
        self.backend.ack(lease).await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        self.backend.stats().await
    }

    pub async fn dead_letters(&self) -> Result<Vec<WorkItem>> {
        self.backend.dead_letters().await
    }

    pub async fn redrive_dead_letters(&self) -> Result<u64> {
        self.backend.redrive_dead_letters().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_config_default() {
        let config = QueueConfig::default();
        assert_eq!(config.max_receive_count, 3);
        assert_eq!(config.visibility_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_work_item_constructors() {
        let key = MessageKey::new(Utc::now(), Uuid::new_v4());
        let process = WorkItem::process("ns1", key);
        let respond = WorkItem::respond("ns1", key);
        assert_eq!(process.kind, WorkKind::Process);
        assert_eq!(respond.kind, WorkKind::Respond);
        assert_eq!(process.receive_count, 0);
        assert_ne!(process.item_id, respond.item_id);
    }

    #[tokio::test]
    async fn test_dequeue_wait_times_out_empty() {
        let queue = WorkQueue::in_memory(QueueConfig {
            poll_interval: Duration::from_millis(5),
            ..QueueConfig::default()
        });
        let lease = queue
            .dequeue_wait(Duration::from_millis(20))
            .await
            .unwrap();
        assert!(lease.is_none());
    }
}
