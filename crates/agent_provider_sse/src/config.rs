use std::time::Duration;

use url::Url;

use crate::error::AgentApiError;
use crate::retry::BASE_DELAY_MS;

/// Transport configuration for one agent chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentApiConfig {
    /// Absolute URL of the streaming chat endpoint.
    pub endpoint: String,
    /// Sent as `conversationId`; lets the server correlate turns.
    pub conversation_id: Option<String>,
    /// Optional whole-request timeout.
    pub timeout: Option<Duration>,
    /// Delay before the first retry; doubles per attempt.
    pub retry_base_delay: Duration,
}

impl AgentApiConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            conversation_id: None,
            timeout: None,
            retry_base_delay: Duration::from_millis(BASE_DELAY_MS),
        }
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Parses the endpoint, accepting only `http`/`https` URLs.
    pub fn endpoint_url(&self) -> Result<Url, AgentApiError> {
        let trimmed = self.endpoint.trim();
        if trimmed.is_empty() {
            return Err(AgentApiError::MissingEndpoint);
        }

        let url = Url::parse(trimmed)
            .map_err(|error| AgentApiError::InvalidEndpoint(format!("{trimmed}: {error}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(AgentApiError::InvalidEndpoint(format!(
                "{trimmed}: unsupported scheme '{scheme}'"
            ))),
        }
    }
}
