//! `cortex purge` - expire old message rows.
//!
//! Messages past their retention horizon are the only rows the store ever
//! physically deletes; derived entities are untouched (their back-references
//! are weak by design), and the journal keeps the raw events.

use anyhow::Result;
use chrono::Utc;
use clap::Args;

use cortex_core::store::EntityStore;

use crate::output::{self, OutputFormat};
use crate::runtime::Runtime;

#[derive(Args)]
pub struct PurgeArgs {
    /// Namespace to sweep
    #[arg(long, short)]
    pub namespace: String,
}

pub async fn execute(args: PurgeArgs, runtime: &Runtime, _format: OutputFormat) -> Result<()> {
    let store = runtime.store().await?;
    let removed = store.purge_expired(&args.namespace, Utc::now()).await?;
    output::print_success(&format!("Expired {} message row(s)", removed));
    Ok(())
}
