//! Execution collaborator for `<exe>` commands.
//!
//! A [`CommandExecutor`] turns an [`ExecRequest`] into an [`ExecResponse`] and never
//! fails outright: every problem (validation, spawn, timeout, transport) comes back
//! as `success: false` with a message in `stderr`. [`LocalExecutor`] runs commands
//! through `bash -lc`; [`HttpExecutor`] forwards them to a remote `/api/exec`
//! endpoint speaking the same JSON shapes.

pub mod error;
pub mod format;
pub mod http;
pub mod local;
pub mod request;

pub use error::ExecError;
pub use format::format_exec_result;
pub use http::HttpExecutor;
pub use local::LocalExecutor;
pub use request::{ExecRequest, ExecResponse};

/// Working directory used when a request names none.
pub const DEFAULT_WORKDIR: &str = "/myapp";
/// Timeout used when a request names none.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Longest accepted command, in characters.
pub const MAX_COMMAND_CHARS: usize = 5_000;
/// Per-stream output cap.
pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Runs one command request to completion.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, request: &ExecRequest) -> ExecResponse;
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for std::sync::Arc<T> {
    fn execute(&self, request: &ExecRequest) -> ExecResponse {
        (**self).execute(request)
    }
}

/// Checks the command length bounds shared by every executor.
pub fn validate_command(command: &str) -> Result<(), ExecError> {
    let len = command.chars().count();
    if len == 0 {
        return Err(ExecError::EmptyCommand);
    }
    if len > MAX_COMMAND_CHARS {
        return Err(ExecError::CommandTooLong {
            len,
            max: MAX_COMMAND_CHARS,
        });
    }
    Ok(())
}
