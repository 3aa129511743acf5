//! Configuration management.
//!
//! Every component receives its configuration explicitly at construction;
//! nothing reads ambient global state. This is what lets the replay engine
//! run the processing logic with different bounds than production.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::queue::QueueConfig;
use crate::telemetry::TelemetryConfig;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Entity store configuration
    pub store: StoreConfig,

    /// Durable journal configuration
    #[serde(default)]
    pub journal: JournalConfig,

    /// Work queue configuration
    #[serde(default)]
    pub queue: QueueRuntimeConfig,

    /// Processing worker configuration
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// Response dispatcher configuration
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Agent capability configuration
    pub agent: AgentConfig,

    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    /// Root directory for journal files
    #[serde(default = "default_journal_root")]
    pub root: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            root: default_journal_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueRuntimeConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Key prefix for the processing queue
    #[serde(default = "default_process_prefix")]
    pub process_prefix: String,

    /// Key prefix for the response queue
    #[serde(default = "default_respond_prefix")]
    pub respond_prefix: String,

    /// Lease and dead-letter settings, shared by both queues
    #[serde(default)]
    pub settings: QueueConfig,
}

impl Default for QueueRuntimeConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            process_prefix: default_process_prefix(),
            respond_prefix: default_respond_prefix(),
            settings: QueueConfig::default(),
        }
    }
}

/// Processing worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    /// Maximum concurrent message processings
    #[serde(default = "default_processor_concurrency")]
    pub concurrency: usize,

    /// How long one dequeue poll blocks before giving up
    #[serde(default = "default_poll_timeout", with = "humantime_serde")]
    pub poll_timeout: Duration,

    /// Attempts per message for transient agent failures
    #[serde(default = "default_agent_attempts")]
    pub agent_attempts: u32,

    /// Delay between local agent retries
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Maximum entity summaries passed to the agent as context
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            concurrency: default_processor_concurrency(),
            poll_timeout: default_poll_timeout(),
            agent_attempts: default_agent_attempts(),
            retry_delay: default_retry_delay(),
            context_limit: default_context_limit(),
        }
    }
}

/// Response dispatcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Maximum concurrent deliveries
    #[serde(default = "default_dispatcher_concurrency")]
    pub concurrency: usize,

    /// How long one dequeue poll blocks before giving up
    #[serde(default = "default_poll_timeout", with = "humantime_serde")]
    pub poll_timeout: Duration,

    /// Outbound delivery endpoint URL
    #[serde(default = "default_delivery_endpoint")]
    pub endpoint: String,

    /// Bearer token for the delivery endpoint
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-delivery timeout
    #[serde(default = "default_delivery_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: default_dispatcher_concurrency(),
            poll_timeout: default_poll_timeout(),
            endpoint: default_delivery_endpoint(),
            api_key: None,
            timeout: default_delivery_timeout(),
        }
    }
}

/// Agent capability configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Inference endpoint URL
    pub endpoint: String,

    /// Bearer token for the endpoint
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-call timeout
    #[serde(default = "default_agent_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

// Default value functions
fn default_max_connections() -> u32 {
    20
}
fn default_journal_root() -> PathBuf {
    PathBuf::from("data/journal")
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_process_prefix() -> String {
    "cortex:process".to_string()
}
fn default_respond_prefix() -> String {
    "cortex:respond".to_string()
}
fn default_processor_concurrency() -> usize {
    4
}
fn default_dispatcher_concurrency() -> usize {
    2
}
fn default_poll_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_agent_attempts() -> u32 {
    3
}
fn default_retry_delay() -> Duration {
    Duration::from_millis(250)
}
fn default_context_limit() -> usize {
    25
}
fn default_agent_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_delivery_endpoint() -> String {
    "http://localhost:8799/deliver".to_string()
}
fn default_delivery_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CORTEX").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CORTEX").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processor_defaults() {
        let config = ProcessorConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.agent_attempts, 3);
    }

    #[test]
    fn test_queue_runtime_defaults() {
        let config = QueueRuntimeConfig::default();
        assert_eq!(config.settings.max_receive_count, 3);
        assert_ne!(config.process_prefix, config.respond_prefix);
    }
}
