//! Subscriber setup for the binary. Library code only emits `tracing` events.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::DEFAULT_LOG_FILTER;

/// Builds the filter from `AGENT_WORKSPACE_LOG`, falling back to `info` when the
/// directive does not parse.
pub fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives)
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs a stderr `fmt` subscriber. Returns false when one is already set.
pub fn init(directives: &str) -> bool {
    fmt()
        .with_env_filter(env_filter(directives))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
