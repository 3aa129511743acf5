//! # Cortex Core
//!
//! Durable capture-and-derive pipeline for free-form personal messages.
//!
//! ## Architecture
//!
//! - **Ingress Receiver**: journals every raw message, writes the message
//!   row, queues processing work, returns immediately
//! - **Durable Journal**: append-only, immutable raw-event log and the
//!   source of truth for replay
//! - **Entity Store**: one namespace-keyed store for messages, tasks,
//!   todos, and reminders, with optimistic conditional writes
//! - **Work Queue**: lease-based at-least-once delivery with a receive
//!   budget and dead-letter parking
//! - **Processing Worker**: drives messages through the
//!   `received → processing → processed|failed` state machine and invokes
//!   the external agent capability
//! - **Response Dispatcher**: delivers settled outcomes through the
//!   outbound transport and marks messages `sent`
//! - **Replay Engine**: rebuilds derived state from the journal against a
//!   fresh target store
//! - **Telemetry**: structured logging and Prometheus metrics

pub mod agent;
pub mod config;
pub mod error;
pub mod ingress;
pub mod journal;
pub mod model;
pub mod queue;
pub mod replay;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use error::{CortexError, Disposition, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::agent::{AgentInvoker, AgentOutcome, HttpAgentInvoker, ProposedEntity};
    pub use crate::config::Config;
    pub use crate::error::{CortexError, Disposition, ErrorCode, ErrorContext, Result};
    pub use crate::ingress::IngressReceiver;
    pub use crate::journal::{DurableJournal, FileJournal, InMemoryJournal, JournalRef, RawEvent, TimeRange};
    pub use crate::model::{
        EntityRecord, EntitySummary, ItemType, Message, MessageKey, MessageStatus, Reminder,
        ReminderRecurrence, ReminderStatus, Task, TaskPriority, TaskStatus, Todo,
    };
    pub use crate::queue::{
        InMemoryQueueBackend, Lease, QueueBackend, QueueConfig, QueueStats, RedisQueueBackend,
        WorkItem, WorkKind, WorkQueue,
    };
    pub use crate::replay::{ReplayEngine, ReplayReport};
    pub use crate::store::{
        EntityStore, InMemoryEntityStore, PostgresEntityStore, QueryPage,
    };
    pub use crate::worker::{
        OutboundTransport, ProcessOutcome, ProcessingWorker, Processor, ResponseDispatcher,
        WebhookTransport, WorkerHandle, WorkerStats,
    };
}
