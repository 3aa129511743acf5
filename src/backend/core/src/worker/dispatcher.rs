//! The response dispatcher: delivers settled outcomes back to the user.
//!
//! Consumes the response queue, renders the message's outcome, hands it to
//! the outbound transport, and marks the message `sent`. Delivery failures
//! rely on lease redelivery; items that exhaust the receive budget are
//! parked in the dead-letter queue for an operator rather than dropped.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::error::{CortexError, Result};
use crate::model::{Message, MessageStatus};
use crate::queue::{Lease, WorkKind, WorkQueue};
use crate::store::EntityStore;
use crate::telemetry::metrics;

use super::{WorkerHandle, WorkerStats};

// ═══════════════════════════════════════════════════════════════════════════════
// Outbound Transport
// ═══════════════════════════════════════════════════════════════════════════════

/// The external delivery channel (chat-bot send API, push gateway...).
#[async_trait]
pub trait OutboundTransport: Send + Sync {
    /// Deliver a rendered response to the user.
    async fn deliver(&self, namespace: &str, message_id: Uuid, text: &str) -> Result<()>;
}

/// Outbound transport that posts responses to a webhook endpoint.
pub struct WebhookTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct DeliverRequest<'a> {
    namespace: &'a str,
    message_id: Uuid,
    text: &'a str,
}

impl WebhookTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CortexError::from)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl OutboundTransport for WebhookTransport {
    async fn deliver(&self, namespace: &str, message_id: Uuid, text: &str) -> Result<()> {
        let mut request = self.client.post(&self.endpoint).json(&DeliverRequest {
            namespace,
            message_id,
            text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Response Rendering
// ═══════════════════════════════════════════════════════════════════════════════

/// Render the outgoing text for a settled message.
pub fn render_response(message: &Message) -> String {
    match message.status {
        MessageStatus::Failed => {
            let detail = message
                .error_message
                .as_deref()
                .unwrap_or("an unexpected error occurred");
            format!("Sorry, I couldn't process that message: {}.", detail)
        }
        _ => message
            .response_text
            .clone()
            .unwrap_or_else(|| "Noted.".to_string()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Response Dispatcher
// ═══════════════════════════════════════════════════════════════════════════════

/// Worker pool consuming the response queue.
pub struct ResponseDispatcher {
    store: Arc<dyn EntityStore>,
    transport: Arc<dyn OutboundTransport>,
    respond_queue: WorkQueue,
    config: DispatcherConfig,
    stats: WorkerStats,
}

impl ResponseDispatcher {
    pub fn new(
        store: Arc<dyn EntityStore>,
        transport: Arc<dyn OutboundTransport>,
        respond_queue: WorkQueue,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            transport,
            respond_queue,
            config,
            stats: WorkerStats::new(),
        }
    }

    /// Deliver one response item. Returns `true` when the lease should be
    /// acked, `false` to release it for redelivery.
    async fn dispatch(&self, lease: &Lease) -> Result<bool> {
        let item = &lease.item;
        let Some(mut message) = self
            .store
            .get_message(&item.namespace, &item.message)
            .await?
        else {
            warn!(
                namespace = %item.namespace,
                message_id = %item.message.message_id,
                "Response item references a missing message, dropping"
            );
            return Ok(true);
        };

        match message.status {
            // Duplicate delivery after the response already went out.
            MessageStatus::Sent | MessageStatus::Archived => return Ok(true),
            MessageStatus::Processed | MessageStatus::Failed => {}
            // Not settled yet: the item arrived ahead of the state machine
            // (e.g. a redelivered duplicate); let the lease lapse and retry.
            MessageStatus::Received | MessageStatus::Processing => return Ok(false),
        }

        let text = render_response(&message);
        let expected = message.status.as_str();
        self.transport
            .deliver(&item.namespace, message.message_id, &text)
            .await?;

        message.transition(MessageStatus::Sent)?;
        match self
            .store
            .put_if_status(&message.clone().into(), expected)
            .await
        {
            Ok(()) => {}
            // Another dispatcher delivered concurrently; theirs counts.
            Err(e) if e.is_conflict() => return Ok(true),
            Err(e) => return Err(e),
        }

        metrics::record_response_sent(&item.namespace);
        info!(
            namespace = %item.namespace,
            message_id = %message.message_id,
            "Response delivered"
        );
        Ok(true)
    }

    /// Start the pool, returning a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
        let stats = self.stats.clone();
        let handle_stats = stats.clone();
        let dispatcher = Arc::new(self);

        let join = tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(dispatcher.config.concurrency));
            info!(
                concurrency = dispatcher.config.concurrency,
                "Response dispatcher started"
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
                    lease = dispatcher
                        .respond_queue
                        .dequeue_wait(dispatcher.config.poll_timeout) => lease,
                };

                match lease {
                    Ok(Some(lease)) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        let stats = stats.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            stats.active.fetch_add(1, Ordering::Relaxed);
                            stats.processed.fetch_add(1, Ordering::Relaxed);
                            handle_lease(&dispatcher, &stats, lease).await;
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

            let _ = semaphore
                .acquire_many(dispatcher.config.concurrency as u32)
                .await;
            info!("Response dispatcher stopped");
        });

        WorkerHandle::new(shutdown_tx, handle_stats, join)
    }
}

async fn handle_lease(dispatcher: &ResponseDispatcher, stats: &WorkerStats, lease: Lease) {
    if lease.item.kind != WorkKind::Respond {
        warn!(
            item_id = %lease.item.item_id,
            kind = %lease.item.kind,
            "Unexpected item on response queue"
        );
        let _ = dispatcher.respond_queue.ack(&lease).await;
        return;
    }

    match dispatcher.dispatch(&lease).await {
        Ok(true) => {
            if let Err(e) = dispatcher.respond_queue.ack(&lease).await {
                e.log();
            }
            stats.succeeded.fetch_add(1, Ordering::Relaxed);
        }
        Ok(false) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            // Delivery failures ride the lease-expiry retry; exhaustion
            // parks the item in the dead-letter queue.
            e.log();
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatcherConfig;
    use crate::error::ErrorCode;
    use crate::model::MessageKey;
    use crate::queue::{QueueConfig, WorkItem};
    use crate::store::InMemoryEntityStore;
    use chrono::Utc;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Mutex;

    /// Transport stub that records deliveries and can fail on demand.
    struct CaptureTransport {
        delivered: Mutex<Vec<(String, Uuid, String)>>,
        failures_remaining: AtomicU32,
    }

    impl CaptureTransport {
        fn new() -> Arc<Self> {
            Self::failing(0)
        }

        fn failing(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
                failures_remaining: AtomicU32::new(failures),
            })
        }
    }

    #[async_trait]
    impl OutboundTransport for CaptureTransport {
        async fn deliver(&self, namespace: &str, message_id: Uuid, text: &str) -> Result<()> {
            if self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(CortexError::delivery_failed("stub transport outage"));
            }
            self.delivered
                .lock()
                .await
                .push((namespace.to_string(), message_id, text.to_string()));
            Ok(())
        }
    }

    async fn settled_message(
        store: &Arc<InMemoryEntityStore>,
        status: MessageStatus,
        detail: Option<&str>,
    ) -> MessageKey {
        let key = MessageKey::new(Utc::now(), Uuid::new_v4());
        let mut message = Message::received("ns1", key, "buy milk", "log/ref.json");
        message.transition(MessageStatus::Processing).unwrap();
        match status {
            MessageStatus::Processed => {
                message.response_text = Some("Captured one task.".to_string());
                message.transition(MessageStatus::Processed).unwrap();
            }
            MessageStatus::Failed => {
                message.fail(detail.unwrap_or("agent gave up")).unwrap();
            }
            other => panic!("unsupported seed status {}", other),
        }
        store.put(&message.into()).await.unwrap();
        key
    }

    fn dispatcher(
        store: Arc<InMemoryEntityStore>,
        transport: Arc<CaptureTransport>,
        queue: WorkQueue,
    ) -> ResponseDispatcher {
        ResponseDispatcher::new(
            store,
            transport,
            queue,
            DispatcherConfig {
                poll_timeout: std::time::Duration::from_millis(20),
                ..DispatcherConfig::default()
            },
        )
    }

    fn queue() -> WorkQueue {
        WorkQueue::in_memory(QueueConfig {
            poll_interval: std::time::Duration::from_millis(5),
            visibility_timeout: std::time::Duration::from_millis(50),
            ..QueueConfig::default()
        })
    }

    #[tokio::test]
    async fn test_delivers_and_marks_sent() {
        let store = Arc::new(InMemoryEntityStore::new());
        let transport = CaptureTransport::new();
        let queue = queue();
        let key = settled_message(&store, MessageStatus::Processed, None).await;

        queue.enqueue(WorkItem::respond("ns1", key)).await.unwrap();
        let lease = queue.dequeue().await.unwrap().unwrap();

        let dispatcher = dispatcher(store.clone(), transport.clone(), queue.clone());
        assert!(dispatcher.dispatch(&lease).await.unwrap());

        let delivered = transport.delivered.lock().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].2, "Captured one task.");

        let message = store.get_message("ns1", &key).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn test_failure_notice_for_failed_message() {
        let store = Arc::new(InMemoryEntityStore::new());
        let transport = CaptureTransport::new();
        let queue = queue();
        let key = settled_message(&store, MessageStatus::Failed, Some("agent rejected it")).await;

        queue.enqueue(WorkItem::respond("ns1", key)).await.unwrap();
        let lease = queue.dequeue().await.unwrap().unwrap();

        let dispatcher = dispatcher(store.clone(), transport.clone(), queue.clone());
        assert!(dispatcher.dispatch(&lease).await.unwrap());

        let delivered = transport.delivered.lock().await;
        assert!(delivered[0].2.contains("agent rejected it"));

        let message = store.get_message("ns1", &key).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn test_duplicate_response_item_short_circuits() {
        let store = Arc::new(InMemoryEntityStore::new());
        let transport = CaptureTransport::new();
        let queue = queue();
        let key = settled_message(&store, MessageStatus::Processed, None).await;

        queue.enqueue(WorkItem::respond("ns1", key)).await.unwrap();
        queue.enqueue(WorkItem::respond("ns1", key)).await.unwrap();

        let dispatcher = dispatcher(store.clone(), transport.clone(), queue.clone());
        let first = queue.dequeue().await.unwrap().unwrap();
        assert!(dispatcher.dispatch(&first).await.unwrap());
        let second = queue.dequeue().await.unwrap().unwrap();
        assert!(dispatcher.dispatch(&second).await.unwrap());

        assert_eq!(transport.delivered.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_failure_leaves_message_unsent() {
        let store = Arc::new(InMemoryEntityStore::new());
        let transport = CaptureTransport::failing(1);
        let queue = queue();
        let key = settled_message(&store, MessageStatus::Processed, None).await;

        queue.enqueue(WorkItem::respond("ns1", key)).await.unwrap();
        let lease = queue.dequeue().await.unwrap().unwrap();

        let dispatcher = dispatcher(store.clone(), transport.clone(), queue.clone());
        let err = dispatcher.dispatch(&lease).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DeliveryFailed);

        // Status unchanged; redelivery will retry the send.
        let message = store.get_message("ns1", &key).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Processed);

        // Second attempt (after the stubbed outage) succeeds.
        assert!(dispatcher.dispatch(&lease).await.unwrap());
        let message = store.get_message("ns1", &key).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn test_dispatcher_pool_end_to_end() {
        let store = Arc::new(InMemoryEntityStore::new());
        let transport = CaptureTransport::new();
        let queue = queue();
        let key = settled_message(&store, MessageStatus::Processed, None).await;

        queue.enqueue(WorkItem::respond("ns1", key)).await.unwrap();

        let handle = dispatcher(store.clone(), transport.clone(), queue.clone()).start();

        // Poll until the delivery lands.
        for _ in 0..100 {
            if !transport.delivered.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        handle.shutdown();
        handle.wait().await;

        assert_eq!(transport.delivered.lock().await.len(), 1);
        let message = store.get_message("ns1", &key).await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
    }
}
