//! Cortex CLI - operator tooling for the capture-and-derive pipeline.
//!
//! Provides commands for replaying history, injecting messages, listing
//! stored entities, and inspecting the dead-letter queues.

mod commands;
mod output;
mod runtime;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{dlq, list, purge, replay, send};
use output::OutputFormat;

/// Cortex - capture-and-derive pipeline CLI
#[derive(Parser)]
#[command(
    name = "cortex",
    version = "0.1.0",
    about = "Cortex - capture-and-derive pipeline",
    long_about = "Operator CLI for the Cortex pipeline: replay history, inject \
                  messages, list entities, and inspect dead-letter queues.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true, env = "CORTEX_CONFIG")]
    config: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay journal history into a target store
    Replay(replay::ReplayArgs),

    /// Inject a message through the ingress receiver
    Send(send::SendArgs),

    /// List stored entities
    #[command(subcommand)]
    List(list::ListCommands),

    /// Inspect and redrive the dead-letter queues
    #[command(subcommand)]
    Dlq(dlq::DlqCommands),

    /// Expire message rows past their retention horizon
    Purge(purge::PurgeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let runtime = runtime::Runtime::load(cli.config.as_deref())?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Replay(args) => replay::execute(args, &runtime, format).await,
        Commands::Send(args) => send::execute(args, &runtime, format).await,
        Commands::List(cmd) => list::execute(cmd, &runtime, format).await,
        Commands::Dlq(cmd) => dlq::execute(cmd, &runtime, format).await,
        Commands::Purge(args) => purge::execute(args, &runtime, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
