//! Worker pools that consume the work queues.
//!
//! Each pool runs as an independently scaled set of tasks pulling from its
//! queue; there is no coordination between instances beyond the entity
//! store's conditional write. Shutdown is signalled through a watch
//! channel and drains in-flight work before the pool stops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

mod dispatcher;
mod processor;

pub use dispatcher::{OutboundTransport, ResponseDispatcher, WebhookTransport};
pub use processor::{ProcessOutcome, ProcessingWorker, Processor};

// ═══════════════════════════════════════════════════════════════════════════════
// Worker Statistics
// ═══════════════════════════════════════════════════════════════════════════════

/// Statistics for a worker pool.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    /// Total work items handled
    pub processed: Arc<AtomicU64>,
    /// Items that completed their effect
    pub succeeded: Arc<AtomicU64>,
    /// Items that failed or were released for redelivery
    pub failed: Arc<AtomicU64>,
    /// Items currently being handled
    pub active: Arc<AtomicU64>,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Worker Handle
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle for controlling a running worker pool.
pub struct WorkerHandle {
    shutdown: tokio::sync::watch::Sender<bool>,
    stats: WorkerStats,
    join: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn new(
        shutdown: tokio::sync::watch::Sender<bool>,
        stats: WorkerStats,
        join: tokio::task::JoinHandle<()>,
    ) -> Self {
        Self {
            shutdown,
            stats,
            join,
        }
    }

    /// Signal the pool to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Get worker statistics.
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Wait for the pool to stop after a shutdown signal.
    pub async fn wait(self) {
        let _ = self.join.await;
    }
}
