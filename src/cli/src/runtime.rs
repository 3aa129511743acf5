//! Construction of pipeline components from configuration.
//!
//! The CLI operates directly against the backing services (store, journal,
//! queues); this module is the single place that wires them up.

use anyhow::{Context, Result};
use std::sync::Arc;

use cortex_core::agent::HttpAgentInvoker;
use cortex_core::config::Config;
use cortex_core::journal::FileJournal;
use cortex_core::queue::{RedisQueueBackend, WorkQueue};
use cortex_core::store::PostgresEntityStore;

/// Lazily constructed handles to the backing services.
pub struct Runtime {
    pub config: Config,
}

impl Runtime {
    /// Load configuration from a file or the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config = match path {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("failed to load config from {}", path))?,
            None => Config::load().context("failed to load config from environment")?,
        };
        Ok(Self { config })
    }

    /// Connect to the production entity store.
    pub async fn store(&self) -> Result<Arc<PostgresEntityStore>> {
        let store = PostgresEntityStore::connect(
            &self.config.store.url,
            self.config.store.max_connections,
        )
        .await
        .context("failed to connect to the entity store")?;
        Ok(Arc::new(store))
    }

    /// Open the filesystem journal.
    pub fn journal(&self) -> Arc<FileJournal> {
        Arc::new(FileJournal::new(self.config.journal.root.clone()))
    }

    /// Open the processing work queue.
    pub fn process_queue(&self) -> Result<WorkQueue> {
        let backend = RedisQueueBackend::connect(
            &self.config.queue.redis_url,
            self.config.queue.process_prefix.clone(),
            self.config.queue.settings.clone(),
        )
        .context("failed to open the processing queue")?;
        Ok(WorkQueue::new(Arc::new(backend), &self.config.queue.settings))
    }

    /// Open the response work queue.
    pub fn respond_queue(&self) -> Result<WorkQueue> {
        let backend = RedisQueueBackend::connect(
            &self.config.queue.redis_url,
            self.config.queue.respond_prefix.clone(),
            self.config.queue.settings.clone(),
        )
        .context("failed to open the response queue")?;
        Ok(WorkQueue::new(Arc::new(backend), &self.config.queue.settings))
    }

    /// Build the agent invoker.
    pub fn agent(&self) -> Result<Arc<HttpAgentInvoker>> {
        Ok(Arc::new(HttpAgentInvoker::new(&self.config.agent)?))
    }
}
