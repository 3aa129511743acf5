//! Cortex worker daemon.
//!
//! Runs the processing worker pool and the response dispatcher against the
//! production backends (PostgreSQL store, filesystem journal, Redis queues)
//! until interrupted.

use std::sync::Arc;
use tracing::info;

use cortex_core::agent::HttpAgentInvoker;
use cortex_core::config::Config;
use cortex_core::queue::{RedisQueueBackend, WorkQueue};
use cortex_core::store::PostgresEntityStore;
use cortex_core::telemetry::init_telemetry;
use cortex_core::worker::{
    ProcessingWorker, Processor, ResponseDispatcher, WebhookTransport,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = match std::env::var("CORTEX_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::load()?,
    };

    init_telemetry(&config.telemetry)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Cortex worker starting");

    // Backing services.
    let store = Arc::new(
        PostgresEntityStore::connect(&config.store.url, config.store.max_connections).await?,
    );
    store.migrate().await?;

    let redis_client = redis::Client::open(config.queue.redis_url.as_str())?;
    let process_queue = WorkQueue::new(
        Arc::new(RedisQueueBackend::new(
            redis_client.clone(),
            config.queue.process_prefix.clone(),
            config.queue.settings.clone(),
        )),
        &config.queue.settings,
    );
    let respond_queue = WorkQueue::new(
        Arc::new(RedisQueueBackend::new(
            redis_client,
            config.queue.respond_prefix.clone(),
            config.queue.settings.clone(),
        )),
        &config.queue.settings,
    );

    // External collaborators.
    let agent = Arc::new(HttpAgentInvoker::new(&config.agent)?);
    let transport = Arc::new(WebhookTransport::new(
        config.dispatcher.endpoint.clone(),
        config.dispatcher.api_key.clone(),
        config.dispatcher.timeout,
    )?);

    // Worker pools.
    let processor = Arc::new(Processor::new(
        store.clone(),
        agent,
        config.processor.clone(),
    ));
    let processing = ProcessingWorker::new(
        processor,
        process_queue.clone(),
        respond_queue.clone(),
        config.processor.clone(),
    )
    .start();
    let dispatching = ResponseDispatcher::new(
        store,
        transport,
        respond_queue,
        config.dispatcher.clone(),
    )
    .start();

    info!("Cortex worker running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, draining workers");
    processing.shutdown();
    dispatching.shutdown();
    processing.wait().await;
    dispatching.wait().await;

    info!("Cortex worker stopped");
    Ok(())
}
