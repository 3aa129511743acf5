//! In-memory queue backend with full lease semantics.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use metrics::counter;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;

use super::{Lease, QueueBackend, QueueConfig, QueueStats, WorkItem};

#[derive(Default)]
struct QueueState {
    ready: VecDeque<WorkItem>,
    in_flight: HashMap<Uuid, Lease>,
    dead: VecDeque<WorkItem>,
    acked: u64,
    redelivered: u64,
}

/// In-memory queue backend for tests, development, and replay.
///
/// Implements the same contract as the production backend: visibility
/// windows, redelivery with receive counting, and dead-letter parking.
pub struct InMemoryQueueBackend {
    state: Arc<Mutex<QueueState>>,
    config: QueueConfig,
}

impl InMemoryQueueBackend {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            config,
        }
    }

    /// Return expired leases to the ready queue, or park exhausted items.
    fn reap_expired(&self, state: &mut QueueState) {
        let now = Utc::now();
        let expired: Vec<Uuid> = state
            .in_flight
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(token, _)| *token)
            .collect();

        for token in expired {
            let Some(lease) = state.in_flight.remove(&token) else {
                continue;
            };
            let item = lease.item;
            if item.receive_count >= self.config.max_receive_count {
                tracing::warn!(
                    item_id = %item.item_id,
                    kind = %item.kind,
                    namespace = %item.namespace,
                    receive_count = item.receive_count,
                    "Work item exceeded receive budget, parking in dead-letter queue"
                );
                counter!("cortex_dead_letter_total", "kind" => item.kind.to_string())
                    .increment(1);
                state.dead.push_back(item);
            } else {
                state.redelivered += 1;
                state.ready.push_back(item);
            }
        }
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn enqueue(&self, item: WorkItem) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ready.push_back(item);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Lease>> {
        let mut state = self.state.lock().await;
        self.reap_expired(&mut state);

        let Some(mut item) = state.ready.pop_front() else {
            return Ok(None);
        };
        item.receive_count += 1;

        let lease = Lease {
            item,
            token: Uuid::new_v4(),
            deadline: Utc::now()
                + ChronoDuration::from_std(self.config.visibility_timeout)
                    .unwrap_or_else(|_| ChronoDuration::seconds(60)),
        };
        state.in_flight.insert(lease.token, lease.clone());
        Ok(Some(lease))
    }

    async fn ack(&self, lease: &Lease) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&lease.token).is_some() {
            state.acked += 1;
        }
        // A missing token means the lease already expired; the item may have
        // been redelivered, which the at-least-once contract permits.
        Ok(())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let mut state = self.state.lock().await;
        self.reap_expired(&mut state);
        Ok(QueueStats {
            ready: state.ready.len(),
            in_flight: state.in_flight.len(),
            dead_letter: state.dead.len(),
            acked: state.acked,
            redelivered: state.redelivered,
        })
    }

    async fn dead_letters(&self) -> Result<Vec<WorkItem>> {
        let mut state = self.state.lock().await;
        self.reap_expired(&mut state);
        Ok(state.dead.iter().cloned().collect())
    }

    async fn redrive_dead_letters(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut count = 0;
        while let Some(mut item) = state.dead.pop_front() {
            item.receive_count = 0;
            state.ready.push_back(item);
            count += 1;
        }
        Ok(count)
    }
}
