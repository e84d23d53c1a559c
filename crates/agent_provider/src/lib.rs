//! Provider-neutral contract for streaming one assistant reply.
//!
//! Defines the run lifecycle shared by every agent backend and the message snapshot
//! shape the command dispatcher consumes. Transport details and command handling live
//! elsewhere.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};

/// Identifier for one provider run.
pub type RunId = u64;

/// Shared cancellation flag for a run.
pub type CancelSignal = Arc<AtomicBool>;

/// Error returned while constructing/configuring a provider before any run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire name used by chat endpoints.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Model-facing message history item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum RunMessage {
    User { text: String },
    Assistant { text: String },
}

impl RunMessage {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant { text: text.into() }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::User { text } | Self::Assistant { text } => text,
        }
    }
}

/// Input required to start a provider run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub run_id: RunId,
    pub messages: Vec<RunMessage>,
    pub instructions: String,
}

/// Provider-emitted lifecycle event for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started { run_id: RunId },
    /// Next piece of assistant text, appended to what was already streamed.
    Delta { run_id: RunId, text: String },
    Finished { run_id: RunId },
    Failed { run_id: RunId, error: String },
    Cancelled { run_id: RunId },
}

impl RunEvent {
    #[must_use]
    pub fn run_id(&self) -> RunId {
        match self {
            Self::Started { run_id }
            | Self::Delta { run_id, .. }
            | Self::Finished { run_id }
            | Self::Failed { run_id, .. }
            | Self::Cancelled { run_id } => *run_id,
        }
    }

    /// Returns true when this event terminates the run lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// Full text of a message as observed at one point of its stream.
///
/// `text` only ever grows while `streaming` is true; the snapshot with
/// `streaming == false` carries the final text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSnapshot {
    pub run_id: RunId,
    pub role: Role,
    pub text: String,
    pub streaming: bool,
}

impl MessageSnapshot {
    #[must_use]
    pub fn streaming(run_id: RunId, text: impl Into<String>) -> Self {
        Self {
            run_id,
            role: Role::Assistant,
            text: text.into(),
            streaming: true,
        }
    }

    #[must_use]
    pub fn closed(run_id: RunId, text: impl Into<String>) -> Self {
        Self {
            run_id,
            role: Role::Assistant,
            text: text.into(),
            streaming: false,
        }
    }
}

/// Immutable metadata describing a run provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Provider interface for executing one run request.
pub trait RunProvider: Send + Sync + 'static {
    fn profile(&self) -> ProviderProfile;

    /// Executes a run request and emits lifecycle events in provider order.
    ///
    /// Exactly one terminal event is emitted per run. Implementations poll `cancel`
    /// between deltas and emit `Cancelled` once it is set.
    fn run(
        &self,
        req: RunRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(RunEvent),
    ) -> Result<(), String>;
}
