//! `cortex dlq` - inspect and redrive the dead-letter queues.

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use tabled::Tabled;

use cortex_core::queue::WorkQueue;

use crate::output::{self, OutputFormat};
use crate::runtime::Runtime;

#[derive(Subcommand)]
pub enum DlqCommands {
    /// List parked work items
    List(DlqArgs),
    /// Move parked items back to the ready queue
    Redrive(DlqArgs),
}

#[derive(Args)]
pub struct DlqArgs {
    /// Which queue to operate on
    #[arg(long, value_enum, default_value_t = QueueName::Process)]
    pub queue: QueueName,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum QueueName {
    Process,
    Respond,
}

#[derive(Tabled, Serialize)]
struct DeadLetterRow {
    item_id: String,
    kind: String,
    namespace: String,
    message_id: String,
    receive_count: u32,
    enqueued_at: String,
}

fn open(runtime: &Runtime, name: QueueName) -> Result<WorkQueue> {
    match name {
        QueueName::Process => runtime.process_queue(),
        QueueName::Respond => runtime.respond_queue(),
    }
}

pub async fn execute(cmd: DlqCommands, runtime: &Runtime, format: OutputFormat) -> Result<()> {
    match cmd {
        DlqCommands::List(args) => {
            let queue = open(runtime, args.queue)?;
            let items = queue.dead_letters().await?;
            let rows: Vec<DeadLetterRow> = items
                .iter()
                .map(|item| DeadLetterRow {
                    item_id: item.item_id.to_string(),
                    kind: item.kind.to_string(),
                    namespace: item.namespace.clone(),
                    message_id: item.message.message_id.to_string(),
                    receive_count: item.receive_count,
                    enqueued_at: item.enqueued_at.to_rfc3339(),
                })
                .collect();
            output::print_list(&rows, format);
        }
        DlqCommands::Redrive(args) => {
            let queue = open(runtime, args.queue)?;
            let count = queue.redrive_dead_letters().await?;
            output::print_success(&format!("Redrove {} work item(s)", count));
        }
    }
    Ok(())
}
