//! Telemetry: structured logging and metrics for the pipeline.
//!
//! - **Logging**: JSON for production, pretty for development, with
//!   env-filter level control
//! - **Metrics**: Prometheus counters/histograms for every pipeline stage
//!
//! # Example
//!
//! ```rust,no_run
//! use cortex_core::telemetry::{TelemetryConfig, init_telemetry};
//!
//! let config = TelemetryConfig::default();
//! init_telemetry(&config).expect("Failed to initialize telemetry");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{init_metrics, MetricsConfig};

use serde::Deserialize;

/// Unified telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Service name for identification in logs and metrics
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "cortex-core".to_string()
}

fn default_environment() -> String {
    std::env::var("CORTEX_ENVIRONMENT").unwrap_or_else(|_| "development".to_string())
}

/// Initialize the telemetry stack. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    init_metrics(&config.metrics)?;
    init_logging(&config.logging, &config.environment)?;

    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        "Telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "cortex-core");
        assert!(!config.environment.is_empty());
    }
}
