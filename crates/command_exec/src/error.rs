use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a command could not run to a normal exit.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Invalid request: command must not be empty")]
    EmptyCommand,
    #[error("Invalid request: command is {len} characters, limit is {max}")]
    CommandTooLong { len: usize, max: usize },
    #[error("working directory {} is not a directory", path.display())]
    InvalidWorkdir { path: PathBuf },
    #[error("failed to launch command: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
    #[error("failed waiting for command: {source}")]
    Wait {
        #[source]
        source: io::Error,
    },
    #[error("Command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("HTTP error! status: {status}")]
    HttpStatus { status: u16 },
    #[error("exec request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to initialize async runtime: {source}")]
    Runtime {
        #[source]
        source: io::Error,
    },
}
