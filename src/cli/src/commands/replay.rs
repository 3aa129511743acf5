//! `cortex replay` - rebuild derived state from the journal.

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;

use cortex_core::journal::TimeRange;
use cortex_core::replay::ReplayEngine;
use cortex_core::store::{EntityStore, InMemoryEntityStore, PostgresEntityStore};

use crate::output::{self, OutputFormat};
use crate::runtime::Runtime;

use super::parse_time;

#[derive(Args)]
pub struct ReplayArgs {
    /// Namespace to replay
    #[arg(long, short)]
    pub namespace: String,

    /// Start of the window (RFC 3339 or YYYY-MM-DD), inclusive
    #[arg(long)]
    pub from: Option<String>,

    /// End of the window (RFC 3339 or YYYY-MM-DD), exclusive
    #[arg(long)]
    pub to: Option<String>,

    /// PostgreSQL URL of the target store. Without it the replay runs into
    /// a throwaway in-memory store, which validates processing logic and
    /// produces the report without writing anywhere durable.
    #[arg(long)]
    pub target_url: Option<String>,
}

pub async fn execute(args: ReplayArgs, runtime: &Runtime, format: OutputFormat) -> Result<()> {
    let range = TimeRange {
        start: args.from.as_deref().map(parse_time).transpose()?,
        end: args.to.as_deref().map(parse_time).transpose()?,
    };

    let target: Arc<dyn EntityStore> = match &args.target_url {
        Some(url) => {
            let store = PostgresEntityStore::connect(url, 5)
                .await
                .context("failed to connect to the replay target store")?;
            store.migrate().await.context("failed to migrate the target store")?;
            Arc::new(store)
        }
        None => {
            output::print_info("No target store given; replaying into memory (dry run)");
            Arc::new(InMemoryEntityStore::new())
        }
    };

    let engine = ReplayEngine::new(
        runtime.journal(),
        target,
        runtime.agent()?,
        runtime.config.processor.clone(),
    );

    let report = engine.replay(&args.namespace, range).await?;

    output::print_success(&format!(
        "Replayed {} message(s): {} entities created, {} failures, {} skipped",
        report.messages_replayed, report.entities_created, report.failures, report.skipped
    ));
    if !matches!(format, OutputFormat::Table) {
        output::print_item(&report, format);
    }
    Ok(())
}
