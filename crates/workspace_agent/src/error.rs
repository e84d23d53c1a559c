use thiserror::Error;

use agent_provider::RunId;

/// Failures of the session runtime itself. Provider and execution failures are
/// reported as values, not through this type.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Prompt is empty")]
    EmptyPrompt,
    #[error("Run already active (run {run_id})")]
    RunAlreadyActive { run_id: RunId },
    #[error("Failed to spawn {what} worker")]
    SpawnWorker {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Execution worker for `{command}` panicked")]
    ExecutionPanicked { command: String },
}
