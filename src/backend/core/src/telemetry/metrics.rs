//! Prometheus metrics for the pipeline.
//!
//! Metric names are defined here so every component records against the
//! same series. The exporter runs its own scrape listener; nothing else in
//! the system serves HTTP.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus exporter
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Scrape listener address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:9184".parse().expect("static address parses")
}

/// Install the Prometheus exporter with its scrape listener.
pub fn init_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .install()?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Pipeline Metrics
// ═══════════════════════════════════════════════════════════════════════════════

/// Record a message accepted by the ingress receiver.
pub fn record_message_received(namespace: &str) {
    counter!("cortex_messages_received_total", "namespace" => namespace.to_string())
        .increment(1);
}

/// Record a settled processing outcome.
pub fn record_message_settled(outcome: &str, duration: Duration) {
    counter!("cortex_messages_settled_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("cortex_processing_duration_seconds").record(duration.as_secs_f64());
}

/// Record one local retry of the agent capability.
pub fn record_agent_retry() {
    counter!("cortex_agent_retries_total").increment(1);
}

/// Record derived entities persisted for one message.
pub fn record_entities_created(count: u64) {
    counter!("cortex_entities_created_total").increment(count);
}

/// Record a response delivered to the user.
pub fn record_response_sent(namespace: &str) {
    counter!("cortex_responses_sent_total", "namespace" => namespace.to_string()).increment(1);
}

/// Record one message replayed.
pub fn record_message_replayed(outcome: &str) {
    counter!("cortex_messages_replayed_total", "outcome" => outcome.to_string()).increment(1);
}
