//! Session runtime that turns streamed agent replies into workspace changes.
//!
//! ## Pipeline
//!
//! A [`runtime::SessionRuntime`] starts one provider run at a time on a worker thread.
//! Provider events are queued and applied one at a time: each delta grows the
//! assistant message, and the resulting [`agent_provider::MessageSnapshot`] goes to the
//! [`dispatcher::Dispatcher`], which extracts command batches, suppresses replays by
//! fingerprint, projects them onto the shared [`agent_workspace::Workspace`] and hands
//! `<exe>` commands to a [`command_exec::CommandExecutor`] off the pipeline.
//!
//! ## Configuration
//!
//! [`config::AgentConfig::from_env`] reads `AGENT_WORKSPACE_*` variables:
//!
//! - `AGENT_WORKSPACE_PROVIDER=mock|sse` (default `mock`)
//! - `AGENT_WORKSPACE_ENDPOINT` chat endpoint for `sse`
//! - `AGENT_WORKSPACE_EXECUTOR=local|http|off` (default `local`)
//! - `AGENT_WORKSPACE_EXEC_URL` `/api/exec` endpoint for `http`
//! - `AGENT_WORKSPACE_WORKDIR`, `AGENT_WORKSPACE_EXEC_TIMEOUT_MS`
//! - `AGENT_WORKSPACE_STORE_DIR` enables snapshot persistence
//! - `AGENT_WORKSPACE_LOG` tracing filter, `AGENT_WORKSPACE_SYSTEM_PROMPT` override

use std::sync::{Mutex, MutexGuard};

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod prompt;
pub mod providers;
pub mod report;
pub mod runtime;
pub mod transcript;

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
