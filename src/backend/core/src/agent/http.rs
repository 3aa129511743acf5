//! HTTP implementation of the agent capability.
//!
//! Posts the message text and entity context to a configured inference
//! endpoint and parses the JSON response. HTTP failures are classified into
//! the transient/permanent taxonomy; malformed response bodies are
//! permanent (retrying the call will not fix the payload).

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::AgentConfig;
use crate::error::{CortexError, Result};
use crate::model::EntitySummary;

use super::{AgentInvoker, AgentOutcome};

/// Agent invoker that calls a remote inference endpoint.
pub struct HttpAgentInvoker {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct InferRequest<'a> {
    prompt: &'a str,
    context: &'a [EntitySummary],
}

impl HttpAgentInvoker {
    /// Create an invoker from configuration.
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(CortexError::from)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Create an invoker against an explicit endpoint (tests).
    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::new(&AgentConfig {
            endpoint: endpoint.into(),
            api_key: None,
            timeout,
        })
    }
}

#[async_trait]
impl AgentInvoker for HttpAgentInvoker {
    async fn infer(
        &self,
        message_text: &str,
        context: &[EntitySummary],
    ) -> Result<AgentOutcome> {
        let mut request = self.client.post(&self.endpoint).json(&InferRequest {
            prompt: message_text,
            context,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let body = response.text().await?;

        serde_json::from_str::<AgentOutcome>(&body)
            .map_err(|e| CortexError::agent_response_invalid(e.to_string()))
    }
}
