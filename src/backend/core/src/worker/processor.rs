//! The processing worker: drives messages through
//! `received → processing → processed|failed`.
//!
//! The state machine is deliberately idempotent and state-conditioned. The
//! queue is at-least-once and unordered, so a worker may see a message it
//! (or another worker) already handled; settled messages short-circuit, and
//! the conditional store write decides races. [`Processor`] holds the pure
//! per-message routine so the replay engine can drive the identical logic
//! against a different store with different bounds.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::agent::{AgentInvoker, AgentOutcome};
use crate::config::ProcessorConfig;
use crate::error::{CortexError, Result};
use crate::model::{
    EntityRecord, EntitySummary, ItemType, Message, MessageKey, MessageStatus,
};
use crate::queue::{Lease, WorkItem, WorkKind, WorkQueue};
use crate::store::EntityStore;
use crate::telemetry::metrics;

use super::{WorkerHandle, WorkerStats};

// ═══════════════════════════════════════════════════════════════════════════════
// Process Outcome
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of running one message through the processing routine.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The message settled as processed.
    Processed { entities_created: usize },
    /// The message settled as failed; the reason is user-visible.
    Failed { reason: String },
    /// The message was already settled (duplicate delivery short-circuit).
    AlreadySettled { status: MessageStatus },
    /// Another worker owns the transition; this delivery did nothing.
    Abandoned,
}

impl ProcessOutcome {
    /// Whether the dispatcher still owes the user a response.
    pub fn needs_response(&self) -> bool {
        matches!(
            self,
            Self::Processed { .. }
                | Self::Failed { .. }
                | Self::AlreadySettled {
                    status: MessageStatus::Processed | MessageStatus::Failed
                }
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Processor
// ═══════════════════════════════════════════════════════════════════════════════

/// The per-message processing routine, shared by the worker pool and the
/// replay engine.
pub struct Processor {
    store: Arc<dyn EntityStore>,
    agent: Arc<dyn AgentInvoker>,
    config: ProcessorConfig,
}

impl Processor {
    pub fn new(
        store: Arc<dyn EntityStore>,
        agent: Arc<dyn AgentInvoker>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            agent,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Process one message to a settled status.
    ///
    /// Errors are infrastructure failures only (store unreachable, message
    /// row missing); agent failures settle the message as `failed` and are
    /// reported through the outcome.
    pub async fn process_message(
        &self,
        namespace: &str,
        key: &MessageKey,
    ) -> Result<ProcessOutcome> {
        let started = Instant::now();

        let Some(mut message) = self.store.get_message(namespace, key).await? else {
            return Err(CortexError::not_found("message", key.message_id.to_string()));
        };

        // Duplicate delivery of work that already completed.
        if message.status.is_settled() {
            debug!(
                namespace = %namespace,
                message_id = %key.message_id,
                status = %message.status,
                "Message already settled, skipping"
            );
            return Ok(ProcessOutcome::AlreadySettled {
                status: message.status,
            });
        }

        // Another worker is mid-flight. If it crashed, the lease/receive
        // budget on the work item decides when an operator hears about it.
        if message.status == MessageStatus::Processing {
            return Ok(ProcessOutcome::Abandoned);
        }

        // Claim the message. Losing the conditional write means someone
        // else claimed it first; abandon rather than overwrite.
        message.transition(MessageStatus::Processing)?;
        match self
            .store
            .put_if_status(&message.clone().into(), MessageStatus::Received.as_str())
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_conflict() => return Ok(ProcessOutcome::Abandoned),
            Err(e) => return Err(e),
        }

        let context = self.context_for(namespace).await.unwrap_or_else(|e| {
            // Context is best-effort; a degraded agent call beats a stuck message.
            warn!(namespace = %namespace, error = %e, "Failed to build agent context");
            Vec::new()
        });

        let outcome = match self.infer_with_retry(&message, &context).await {
            Ok(agent_outcome) => self.settle_processed(&mut message, agent_outcome).await?,
            Err(e) => {
                self.settle_failed(&mut message, e.user_message().to_string())
                    .await?
            }
        };

        let label = match &outcome {
            ProcessOutcome::Processed { .. } => "processed",
            _ => "failed",
        };
        metrics::record_message_settled(label, started.elapsed());
        Ok(outcome)
    }

    /// Invoke the agent, retrying transient failures up to the bound.
    async fn infer_with_retry(
        &self,
        message: &Message,
        context: &[EntitySummary],
    ) -> Result<AgentOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.agent.infer(&message.raw_text, context).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && attempt < self.config.agent_attempts => {
                    metrics::record_agent_retry();
                    warn!(
                        message_id = %message.message_id,
                        attempt,
                        error = %e,
                        "Transient agent failure, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Persist derived entities and settle the message as processed.
    async fn settle_processed(
        &self,
        message: &mut Message,
        outcome: AgentOutcome,
    ) -> Result<ProcessOutcome> {
        let mut records = Vec::with_capacity(outcome.entities.len());
        for proposal in &outcome.entities {
            match proposal.materialize(&message.namespace, message.message_id) {
                Ok(record) => records.push(record),
                // Invalid proposals poison the whole response: nothing is
                // created and the message settles as failed.
                Err(e) => {
                    let reason = e.user_message().to_string();
                    return self.settle_failed(message, reason).await;
                }
            }
        }

        self.store.put_many(&records).await?;

        message.response_text = Some(render_reply(&outcome));
        message.transition(MessageStatus::Processed)?;
        match self
            .store
            .put_if_status(&message.clone().into(), MessageStatus::Processing.as_str())
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_conflict() => return Ok(ProcessOutcome::Abandoned),
            Err(e) => return Err(e),
        }

        metrics::record_entities_created(records.len() as u64);
        info!(
            namespace = %message.namespace,
            message_id = %message.message_id,
            entities_created = records.len(),
            "Message processed"
        );
        Ok(ProcessOutcome::Processed {
            entities_created: records.len(),
        })
    }

    /// Settle the message as failed with a user-visible reason.
    async fn settle_failed(
        &self,
        message: &mut Message,
        reason: String,
    ) -> Result<ProcessOutcome> {
        message.fail(reason.clone())?;
        match self
            .store
            .put_if_status(&message.clone().into(), MessageStatus::Processing.as_str())
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_conflict() => return Ok(ProcessOutcome::Abandoned),
            Err(e) => return Err(e),
        }

        warn!(
            namespace = %message.namespace,
            message_id = %message.message_id,
            reason = %reason,
            "Message failed"
        );
        Ok(ProcessOutcome::Failed { reason })
    }

    /// Current relevant entities, summarized for the agent.
    async fn context_for(&self, namespace: &str) -> Result<Vec<EntitySummary>> {
        let mut summaries = Vec::new();
        for item_type in [ItemType::Task, ItemType::Reminder] {
            if summaries.len() >= self.config.context_limit {
                break;
            }
            let page = self
                .store
                .query_prefix(
                    namespace,
                    item_type,
                    None,
                    self.config.context_limit - summaries.len(),
                )
                .await?;
            summaries.extend(page.items.iter().map(|r| r.summary()));
        }
        Ok(summaries)
    }
}

/// Render the user-facing reply for a processed message.
fn render_reply(outcome: &AgentOutcome) -> String {
    let mut lines = Vec::new();
    let reply = outcome.reply.trim();
    if !reply.is_empty() {
        lines.push(reply.to_string());
    }
    for proposal in &outcome.entities {
        lines.push(format!("• Captured {}", proposal.describe()));
    }
    if lines.is_empty() {
        lines.push("Noted.".to_string());
    }
    lines.join("\n")
}

// ═══════════════════════════════════════════════════════════════════════════════
// Processing Worker Pool
// ═══════════════════════════════════════════════════════════════════════════════

/// Worker pool consuming the processing queue.
pub struct ProcessingWorker {
    processor: Arc<Processor>,
    process_queue: WorkQueue,
    respond_queue: WorkQueue,
    config: ProcessorConfig,
    stats: WorkerStats,
}

impl ProcessingWorker {
    pub fn new(
        processor: Arc<Processor>,
        process_queue: WorkQueue,
        respond_queue: WorkQueue,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            processor,
            process_queue,
            respond_queue,
            config,
            stats: WorkerStats::new(),
        }
    }

    /// Start the pool, returning a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
        let stats = self.stats.clone();
        let handle_stats = stats.clone();

        let join = tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
            info!(
                concurrency = self.config.concurrency,
                "Processing worker started"
            );

            loop {
                let permit = tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() { break; }
                        continue;
                    }
                    permit = Arc::clone(&semaphore).acquire_owned() => {
                        match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        }
                    }
                };

                let lease = tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() { break; }
                        continue;
                    }
                    lease = self.process_queue.dequeue_wait(self.config.poll_timeout) => lease,
                };

                match lease {
                    Ok(Some(lease)) => {
                        let processor = Arc::clone(&self.processor);
                        let process_queue = self.process_queue.clone();
                        let respond_queue = self.respond_queue.clone();
                        let stats = stats.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            stats.active.fetch_add(1, Ordering::Relaxed);
                            handle_lease(processor, process_queue, respond_queue, &stats, lease)
                                .await;
                            stats.active.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                    Ok(None) => {}
                    Err(e) => {
                        e.log();
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }

            // Drain in-flight work before reporting stopped.
            let _ = semaphore.acquire_many(self.config.concurrency as u32).await;
            info!("Processing worker stopped");
        });

        WorkerHandle::new(shutdown_tx, handle_stats, join)
    }
}

/// Handle one leased work item end to end.
async fn handle_lease(
    processor: Arc<Processor>,
    process_queue: WorkQueue,
    respond_queue: WorkQueue,
    stats: &WorkerStats,
    lease: Lease,
) {
    stats.processed.fetch_add(1, Ordering::Relaxed);
    let item = lease.item.clone();

    if item.kind != WorkKind::Process {
        warn!(item_id = %item.item_id, kind = %item.kind, "Unexpected item on processing queue");
        let _ = process_queue.ack(&lease).await;
        return;
    }

    match processor
        .process_message(&item.namespace, &item.message)
        .await
    {
        Ok(outcome) => {
            if outcome == ProcessOutcome::Abandoned {
                // Another worker owns the message; let the lease lapse so
                // the item redelivers (and eventually dead-letters) if that
                // worker died.
                return;
            }

            if outcome.needs_response() {
                let respond = WorkItem::respond(&item.namespace, item.message);
                if let Err(e) = respond_queue.enqueue(respond).await {
                    // Without the response item the user would never hear
                    // back; leave the lease to redeliver.
                    e.log();
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }

            if let Err(e) = process_queue.ack(&lease).await {
                e.log();
            }
            stats.succeeded.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            e.log();
            stats.failed.fetch_add(1, Ordering::Relaxed);
            if !e.is_retryable() {
                // Poison item (e.g. message row missing): retrying cannot
                // help, park the failure with an ack so it stops looping.
                let _ = process_queue.ack(&lease).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentOutcome, ProposedEntity};
    use crate::error::ErrorCode;
    use crate::journal::{DurableJournal, InMemoryJournal, RawEvent};
    use crate::model::Task;
    use crate::queue::QueueConfig;
    use crate::store::InMemoryEntityStore;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    /// Agent stub that plays back a script of outcomes.
    struct ScriptedAgent {
        script: Mutex<VecDeque<ScriptStep>>,
        calls: AtomicU32,
    }

    enum ScriptStep {
        Succeed(AgentOutcome),
        Transient,
        Permanent,
    }

    impl ScriptedAgent {
        fn new(script: Vec<ScriptStep>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl AgentInvoker for ScriptedAgent {
        async fn infer(
            &self,
            _message_text: &str,
            _context: &[EntitySummary],
        ) -> Result<AgentOutcome> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            match self.script.lock().await.pop_front() {
                Some(ScriptStep::Succeed(outcome)) => Ok(outcome),
                Some(ScriptStep::Transient) => Err(CortexError::with_internal(
                    ErrorCode::AgentUnavailable,
                    "External service is temporarily unavailable",
                    "stub transient failure",
                )),
                Some(ScriptStep::Permanent) | None => Err(CortexError::with_internal(
                    ErrorCode::AgentRejected,
                    "External service rejected the request",
                    "stub permanent failure",
                )),
            }
        }
    }

    fn one_task_outcome() -> AgentOutcome {
        AgentOutcome {
            reply: "Captured one task.".to_string(),
            entities: vec![ProposedEntity::Task {
                title: "buy milk".to_string(),
                description: None,
                due_date: NaiveDate::from_ymd_opt(2026, 8, 7),
                priority: None,
                category: None,
            }],
        }
    }

    fn fast_config() -> ProcessorConfig {
        ProcessorConfig {
            retry_delay: std::time::Duration::from_millis(1),
            ..ProcessorConfig::default()
        }
    }

    async fn seed_message(
        store: &Arc<InMemoryEntityStore>,
        namespace: &str,
        text: &str,
    ) -> MessageKey {
        let journal = InMemoryJournal::new();
        let key = MessageKey::new(Utc::now(), Uuid::new_v4());
        let event = RawEvent::new(namespace, key.message_id, key.timestamp, text, "test");
        let reference = journal.append(&event).await.unwrap();
        let message = Message::received(namespace, key, text, reference.key);
        store.put(&message.into()).await.unwrap();
        key
    }

    #[tokio::test]
    async fn test_processed_message_creates_entities_with_source() {
        let store: Arc<InMemoryEntityStore> = Arc::new(InMemoryEntityStore::new());
        let agent = ScriptedAgent::new(vec![ScriptStep::Succeed(one_task_outcome())]);
        let processor = Processor::new(store.clone(), agent, fast_config());

        let key = seed_message(&store, "ns1", "buy milk tomorrow").await;
        let outcome = processor.process_message("ns1", &key).await.unwrap();

        assert_eq!(outcome, ProcessOutcome::Processed { entities_created: 1 });

        let message = store.get_message("ns1", &key).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Processed);
        assert!(message.response_text.as_deref().unwrap().contains("buy milk"));

        let tasks = store
            .query_prefix("ns1", ItemType::Task, None, 10)
            .await
            .unwrap();
        assert_eq!(tasks.items.len(), 1);
        let EntityRecord::Task(task) = &tasks.items[0] else {
            panic!("expected a task");
        };
        assert_eq!(task.title, "buy milk");
        assert_eq!(task.source_message_id, key.message_id);
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 8, 7));
    }

    #[tokio::test]
    async fn test_duplicate_processing_is_idempotent() {
        let store: Arc<InMemoryEntityStore> = Arc::new(InMemoryEntityStore::new());
        // Only one scripted success: a second agent call would fail the test
        // by settling the message as failed.
        let agent = ScriptedAgent::new(vec![ScriptStep::Succeed(one_task_outcome())]);
        let processor = Processor::new(store.clone(), agent.clone(), fast_config());

        let key = seed_message(&store, "ns1", "buy milk").await;

        let first = processor.process_message("ns1", &key).await.unwrap();
        assert!(matches!(first, ProcessOutcome::Processed { .. }));

        // Simulated duplicate queue delivery.
        let second = processor.process_message("ns1", &key).await.unwrap();
        assert_eq!(
            second,
            ProcessOutcome::AlreadySettled {
                status: MessageStatus::Processed
            }
        );

        assert_eq!(agent.calls(), 1);
        let tasks = store
            .query_prefix("ns1", ItemType::Task, None, 10)
            .await
            .unwrap();
        assert_eq!(tasks.items.len(), 1, "exactly one set of derived entities");
    }

    #[tokio::test]
    async fn test_transient_failures_below_bound_still_succeed() {
        let store: Arc<InMemoryEntityStore> = Arc::new(InMemoryEntityStore::new());
        let agent = ScriptedAgent::new(vec![
            ScriptStep::Transient,
            ScriptStep::Transient,
            ScriptStep::Transient,
            ScriptStep::Succeed(one_task_outcome()),
        ]);
        let config = ProcessorConfig {
            agent_attempts: 5,
            ..fast_config()
        };
        let processor = Processor::new(store.clone(), agent.clone(), config);

        let key = seed_message(&store, "ns1", "buy milk").await;
        let outcome = processor.process_message("ns1", &key).await.unwrap();

        assert!(matches!(outcome, ProcessOutcome::Processed { .. }));
        assert_eq!(agent.calls(), 4);
        let message = store.get_message("ns1", &key).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Processed);
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_retry_budget() {
        let store: Arc<InMemoryEntityStore> = Arc::new(InMemoryEntityStore::new());
        let agent = ScriptedAgent::new(vec![
            ScriptStep::Transient,
            ScriptStep::Transient,
            ScriptStep::Transient,
        ]);
        let config = ProcessorConfig {
            agent_attempts: 3,
            ..fast_config()
        };
        let processor = Processor::new(store.clone(), agent.clone(), config);

        let key = seed_message(&store, "ns1", "buy milk").await;
        let outcome = processor.process_message("ns1", &key).await.unwrap();

        assert!(matches!(outcome, ProcessOutcome::Failed { .. }));
        assert_eq!(agent.calls(), 3);
        let message = store.get_message("ns1", &key).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Failed);
        assert!(message.error_message.is_some());
    }

    #[tokio::test]
    async fn test_permanent_failure_creates_no_entities() {
        let store: Arc<InMemoryEntityStore> = Arc::new(InMemoryEntityStore::new());
        let agent = ScriptedAgent::new(vec![ScriptStep::Permanent]);
        let processor = Processor::new(store.clone(), agent.clone(), fast_config());

        let key = seed_message(&store, "ns1", "buy milk").await;
        let outcome = processor.process_message("ns1", &key).await.unwrap();

        assert!(matches!(outcome, ProcessOutcome::Failed { .. }));
        assert_eq!(agent.calls(), 1, "permanent errors are not retried");

        let message = store.get_message("ns1", &key).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Failed);

        let tasks = store
            .query_prefix("ns1", ItemType::Task, None, 10)
            .await
            .unwrap();
        assert!(tasks.items.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_proposal_fails_message_without_entities() {
        let store: Arc<InMemoryEntityStore> = Arc::new(InMemoryEntityStore::new());
        let outcome = AgentOutcome {
            reply: String::new(),
            entities: vec![
                ProposedEntity::Task {
                    title: "valid".to_string(),
                    description: None,
                    due_date: None,
                    priority: None,
                    category: None,
                },
                ProposedEntity::Todo {
                    text: "  ".to_string(),
                    order: 0,
                },
            ],
        };
        let agent = ScriptedAgent::new(vec![ScriptStep::Succeed(outcome)]);
        let processor = Processor::new(store.clone(), agent, fast_config());

        let key = seed_message(&store, "ns1", "mixed bag").await;
        let result = processor.process_message("ns1", &key).await.unwrap();

        assert!(matches!(result, ProcessOutcome::Failed { .. }));
        let tasks = store
            .query_prefix("ns1", ItemType::Task, None, 10)
            .await
            .unwrap();
        assert!(tasks.items.is_empty(), "partial writes are not allowed");
    }

    #[tokio::test]
    async fn test_in_flight_message_is_abandoned() {
        let store: Arc<InMemoryEntityStore> = Arc::new(InMemoryEntityStore::new());
        let agent = ScriptedAgent::new(vec![ScriptStep::Succeed(one_task_outcome())]);
        let processor = Processor::new(store.clone(), agent.clone(), fast_config());

        let key = seed_message(&store, "ns1", "buy milk").await;

        // Another worker already claimed the message.
        let mut claimed = store.get_message("ns1", &key).await.unwrap().unwrap();
        claimed.transition(MessageStatus::Processing).unwrap();
        store.put(&claimed.into()).await.unwrap();

        let outcome = processor.process_message("ns1", &key).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Abandoned);
        assert_eq!(agent.calls(), 0);
    }

    #[tokio::test]
    async fn test_status_never_regresses() {
        let store: Arc<InMemoryEntityStore> = Arc::new(InMemoryEntityStore::new());
        let agent = ScriptedAgent::new(vec![ScriptStep::Succeed(one_task_outcome())]);
        let processor = Processor::new(store.clone(), agent, fast_config());

        let key = seed_message(&store, "ns1", "buy milk").await;
        processor.process_message("ns1", &key).await.unwrap();
        processor.process_message("ns1", &key).await.unwrap();
        processor.process_message("ns1", &key).await.unwrap();

        let message = store.get_message("ns1", &key).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Processed);
    }

    #[tokio::test]
    async fn test_context_includes_existing_entities() {
        struct ContextCapture {
            seen: Mutex<Vec<EntitySummary>>,
        }

        #[async_trait]
        impl AgentInvoker for ContextCapture {
            async fn infer(
                &self,
                _message_text: &str,
                context: &[EntitySummary],
            ) -> Result<AgentOutcome> {
                *self.seen.lock().await = context.to_vec();
                Ok(AgentOutcome::default())
            }
        }

        let store: Arc<InMemoryEntityStore> = Arc::new(InMemoryEntityStore::new());
        store
            .put(&Task::new("ns1", "existing task", Uuid::new_v4()).into())
            .await
            .unwrap();

        let agent = Arc::new(ContextCapture {
            seen: Mutex::new(Vec::new()),
        });
        let processor = Processor::new(store.clone(), agent.clone(), fast_config());

        let key = seed_message(&store, "ns1", "another note").await;
        processor.process_message("ns1", &key).await.unwrap();

        let seen = agent.seen.lock().await;
        assert!(seen.iter().any(|s| s.title == "existing task"));
    }

    #[tokio::test]
    async fn test_worker_pool_end_to_end() {
        let store: Arc<InMemoryEntityStore> = Arc::new(InMemoryEntityStore::new());
        let agent = ScriptedAgent::new(vec![ScriptStep::Succeed(one_task_outcome())]);
        let config = ProcessorConfig {
            poll_timeout: std::time::Duration::from_millis(20),
            ..fast_config()
        };
        let processor = Arc::new(Processor::new(store.clone(), agent, config.clone()));

        let queue_config = QueueConfig {
            poll_interval: std::time::Duration::from_millis(5),
            ..QueueConfig::default()
        };
        let process_queue = WorkQueue::in_memory(queue_config.clone());
        let respond_queue = WorkQueue::in_memory(queue_config);

        let key = seed_message(&store, "ns1", "buy milk").await;
        process_queue
            .enqueue(WorkItem::process("ns1", key))
            .await
            .unwrap();

        let worker = ProcessingWorker::new(
            processor,
            process_queue.clone(),
            respond_queue.clone(),
            config,
        );
        let handle = worker.start();

        // Wait for the item to be consumed and the response to be queued.
        let respond = respond_queue
            .dequeue_wait(std::time::Duration::from_secs(2))
            .await
            .unwrap()
            .expect("response item queued");
        assert_eq!(respond.item.kind, WorkKind::Respond);
        assert_eq!(respond.item.message.message_id, key.message_id);

        handle.shutdown();
        handle.wait().await;

        let message = store.get_message("ns1", &key).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Processed);
        let stats = process_queue.stats().await.unwrap();
        assert_eq!(stats.ready, 0);
        assert_eq!(stats.in_flight, 0);
    }
}
