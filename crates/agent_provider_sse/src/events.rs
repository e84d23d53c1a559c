use serde::{Deserialize, Serialize};

/// Stream chunk emitted by the parser after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AgentStreamEvent {
    /// Next piece of assistant text.
    Content { delta: String },
    /// The endpoint finished the reply.
    Done,
    /// The endpoint gave up mid-stream.
    Error { message: String },
}

impl AgentStreamEvent {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}
