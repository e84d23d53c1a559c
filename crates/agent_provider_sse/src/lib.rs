//! HTTP/SSE transport for chat-style agent endpoints.
//!
//! Posts the conversation to an endpoint that answers with a `text/event-stream`
//! of JSON chunks (`content` deltas, `done`, `error`) and adapts the stream to the
//! `agent_provider` run lifecycle. Command handling happens downstream; this crate
//! only moves text.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod payload;
pub mod provider;
pub mod retry;
pub mod sse;

pub use client::{AgentApiClient, CancellationSignal};
pub use config::AgentApiConfig;
pub use error::AgentApiError;
pub use events::AgentStreamEvent;
pub use payload::{ChatMessage, ChatRequest};
pub use provider::{SseAgentProvider, SSE_PROVIDER_ID};
pub use sse::SseStreamParser;
