use agent_provider::{RunMessage, RunRequest};
use serde::{Deserialize, Serialize};

/// One `{role, content}` entry of the chat request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

impl From<&RunMessage> for ChatMessage {
    fn from(message: &RunMessage) -> Self {
        Self::new(message.role().as_str(), message.text())
    }
}

/// Body POSTed to the chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    /// Builds the body for a run; non-blank instructions travel as a leading
    /// `system` message.
    pub fn from_run(request: &RunRequest, conversation_id: Option<&str>) -> Self {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.instructions.trim().is_empty() {
            messages.push(ChatMessage::new("system", request.instructions.clone()));
        }
        messages.extend(request.messages.iter().map(ChatMessage::from));

        Self {
            messages,
            conversation_id: conversation_id.map(ToString::to_string),
        }
    }
}
