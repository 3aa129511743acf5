//! `cortex send` - inject a message through the ingress receiver.

use anyhow::Result;
use clap::Args;

use cortex_core::ingress::IngressReceiver;

use crate::output::{self, OutputFormat};
use crate::runtime::Runtime;

#[derive(Args)]
pub struct SendArgs {
    /// Namespace the message belongs to
    #[arg(long, short)]
    pub namespace: String,

    /// Message text
    pub text: String,
}

pub async fn execute(args: SendArgs, runtime: &Runtime, format: OutputFormat) -> Result<()> {
    let receiver = IngressReceiver::new(
        runtime.store().await?,
        runtime.journal(),
        runtime.process_queue()?,
    )
    .with_source("cli");

    let key = receiver.receive(&args.namespace, &args.text).await?;

    output::print_success(&format!("Message accepted: {}", key.message_id));
    if !matches!(format, OutputFormat::Table) {
        output::print_item(
            &serde_json::json!({
                "namespace": args.namespace,
                "message_id": key.message_id,
                "timestamp": key.timestamp,
            }),
            format,
        );
    }
    Ok(())
}
