//! Redis-backed queue backend for production use.
//!
//! Layout per queue prefix:
//! - `{prefix}:ready` is the list of serialized work items awaiting delivery
//! - `{prefix}:leases` is a sorted set of lease tokens scored by deadline (ms)
//! - `{prefix}:leased` maps lease token -> serialized work item
//! - `{prefix}:dead` holds items that exceeded the receive budget

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use metrics::counter;
use uuid::Uuid;

use crate::error::{CortexError, ErrorCode, Result};

use super::{Lease, QueueBackend, QueueConfig, QueueStats, WorkItem};

/// Redis-backed work queue backend.
pub struct RedisQueueBackend {
    client: redis::Client,
    prefix: String,
    config: QueueConfig,
}

impl RedisQueueBackend {
    /// Create a new Redis queue backend.
    ///
    /// # Arguments
    /// * `client` - A connected Redis client
    /// * `prefix` - Key prefix for this queue (e.g. `"cortex:work"`)
    /// * `config` - Queue configuration
    pub fn new(client: redis::Client, prefix: impl Into<String>, config: QueueConfig) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            config,
        }
    }

    /// Create a backend from a Redis URL.
    pub fn connect(
        url: &str,
        prefix: impl Into<String>,
        config: QueueConfig,
    ) -> Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self::new(client, prefix, config))
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    async fn get_conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                CortexError::with_internal(
                    ErrorCode::QueueUnavailable,
                    "Failed to get Redis connection for work queue",
                    e.to_string(),
                )
            })
    }

    /// Return expired leases to the ready list, or park exhausted items.
    async fn reap_expired(&self, conn: &mut redis::aio::MultiplexedConnection) -> Result<()> {
        let now_ms = Utc::now().timestamp_millis();
        let expired: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.key("leases"))
            .arg("-inf")
            .arg(now_ms)
            .query_async(conn)
            .await?;

        for token in expired {
            let payload: Option<String> = redis::cmd("HGET")
                .arg(self.key("leased"))
                .arg(&token)
                .query_async(conn)
                .await?;

            redis::cmd("ZREM")
                .arg(self.key("leases"))
                .arg(&token)
                .query_async::<_, i64>(conn)
                .await?;
            redis::cmd("HDEL")
                .arg(self.key("leased"))
                .arg(&token)
                .query_async::<_, i64>(conn)
                .await?;

            let Some(payload) = payload else { continue };
            let item: WorkItem = serde_json::from_str(&payload)?;

            if item.receive_count >= self.config.max_receive_count {
                tracing::warn!(
                    item_id = %item.item_id,
                    kind = %item.kind,
                    receive_count = item.receive_count,
                    "Work item exceeded receive budget, parking in dead-letter queue"
                );
                counter!("cortex_dead_letter_total", "kind" => item.kind.to_string())
                    .increment(1);
                redis::cmd("RPUSH")
                    .arg(self.key("dead"))
                    .arg(&payload)
                    .query_async::<_, i64>(conn)
                    .await?;
            } else {
                redis::cmd("RPUSH")
                    .arg(self.key("ready"))
                    .arg(&payload)
                    .query_async::<_, i64>(conn)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    async fn enqueue(&self, item: WorkItem) -> Result<()> {
        let serialized = serde_json::to_string(&item)?;
        let mut conn = self.get_conn().await?;
        redis::cmd("RPUSH")
            .arg(self.key("ready"))
            .arg(&serialized)
            .query_async::<_, i64>(&mut conn)
            .await?;

        tracing::debug!(queue = %self.prefix, item_id = %item.item_id, kind = %item.kind, "Work item enqueued");
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Lease>> {
        let mut conn = self.get_conn().await?;
        self.reap_expired(&mut conn).await?;

        let payload: Option<String> = redis::cmd("LPOP")
            .arg(self.key("ready"))
            .query_async(&mut conn)
            .await?;
        let Some(payload) = payload else {
            return Ok(None);
        };

        let mut item: WorkItem = serde_json::from_str(&payload)?;
        item.receive_count += 1;

        let token = Uuid::new_v4();
        let deadline = Utc::now()
            + ChronoDuration::from_std(self.config.visibility_timeout)
                .unwrap_or_else(|_| ChronoDuration::seconds(60));

        redis::cmd("ZADD")
            .arg(self.key("leases"))
            .arg(deadline.timestamp_millis())
            .arg(token.to_string())
            .query_async::<_, i64>(&mut conn)
            .await?;
        redis::cmd("HSET")
            .arg(self.key("leased"))
            .arg(token.to_string())
            .arg(serde_json::to_string(&item)?)
            .query_async::<_, i64>(&mut conn)
            .await?;

        tracing::debug!(queue = %self.prefix, item_id = %item.item_id, receive_count = item.receive_count, "Work item leased");
        Ok(Some(Lease {
            item,
            token,
            deadline,
        }))
    }

    async fn ack(&self, lease: &Lease) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("ZREM")
            .arg(self.key("leases"))
            .arg(lease.token.to_string())
            .query_async::<_, i64>(&mut conn)
            .await?;
        redis::cmd("HDEL")
            .arg(self.key("leased"))
            .arg(lease.token.to_string())
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let mut conn = self.get_conn().await?;
        let ready: usize = redis::cmd("LLEN")
            .arg(self.key("ready"))
            .query_async(&mut conn)
            .await?;
        let in_flight: usize = redis::cmd("ZCARD")
            .arg(self.key("leases"))
            .query_async(&mut conn)
            .await?;
        let dead_letter: usize = redis::cmd("LLEN")
            .arg(self.key("dead"))
            .query_async(&mut conn)
            .await?;

        Ok(QueueStats {
            ready,
            in_flight,
            dead_letter,
            acked: 0,
            redelivered: 0,
        })
    }

    async fn dead_letters(&self) -> Result<Vec<WorkItem>> {
        let mut conn = self.get_conn().await?;
        let payloads: Vec<String> = redis::cmd("LRANGE")
            .arg(self.key("dead"))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(CortexError::from))
            .collect()
    }

    async fn redrive_dead_letters(&self) -> Result<u64> {
        let mut conn = self.get_conn().await?;
        let mut count = 0;
        loop {
            let payload: Option<String> = redis::cmd("LPOP")
                .arg(self.key("dead"))
                .query_async(&mut conn)
                .await?;
            let Some(payload) = payload else { break };

            let mut item: WorkItem = serde_json::from_str(&payload)?;
            item.receive_count = 0;
            redis::cmd("RPUSH")
                .arg(self.key("ready"))
                .arg(serde_json::to_string(&item)?)
                .query_async::<_, i64>(&mut conn)
                .await?;
            count += 1;
        }
        Ok(count)
    }
}
