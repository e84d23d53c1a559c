use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use crate::error::ExecError;
use crate::request::{ExecRequest, ExecResponse};
use crate::{
    validate_command, CommandExecutor, DEFAULT_TIMEOUT_MS, DEFAULT_WORKDIR, MAX_OUTPUT_BYTES,
};

/// Runs commands on this machine through `bash -lc`.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    default_workdir: PathBuf,
    default_timeout_ms: u64,
    max_output_bytes: usize,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_WORKDIR, DEFAULT_TIMEOUT_MS)
    }
}

struct CapturedOutput {
    bytes: Vec<u8>,
    overflowed: bool,
}

struct Finished {
    status: ExitStatus,
    stdout: CapturedOutput,
    stderr: CapturedOutput,
}

impl LocalExecutor {
    pub fn new(default_workdir: impl Into<PathBuf>, default_timeout_ms: u64) -> Self {
        Self {
            default_workdir: default_workdir.into(),
            default_timeout_ms,
            max_output_bytes: MAX_OUTPUT_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    pub fn default_workdir(&self) -> &Path {
        &self.default_workdir
    }

    fn run(&self, request: &ExecRequest) -> Result<Finished, ExecError> {
        validate_command(&request.command)?;

        let default_workdir = self.default_workdir.to_string_lossy();
        let request = request.resolved(&default_workdir, self.default_timeout_ms);
        let workdir = PathBuf::from(request.workdir.as_deref().unwrap_or(&*default_workdir));
        let timeout_ms = request.timeout_ms.unwrap_or(self.default_timeout_ms);

        if !workdir.is_dir() {
            return Err(ExecError::InvalidWorkdir { path: workdir });
        }

        info!(
            command = %request.command,
            workdir = %workdir.display(),
            timeout_ms,
            "running command"
        );

        let mut child = Command::new("bash")
            .arg("-lc")
            .arg(&request.command)
            .current_dir(&workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn { source })?;

        let stdout = spawn_capture("exec-stdout", child.stdout.take(), self.max_output_bytes);
        let stderr = spawn_capture("exec-stderr", child.stderr.take(), self.max_output_bytes);

        let status = match child.wait_timeout(Duration::from_millis(timeout_ms)) {
            Ok(Some(status)) => status,
            Ok(None) => {
                // Grandchildren may still hold the pipes open; leave the readers detached.
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecError::Timeout { timeout_ms });
            }
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecError::Wait { source });
            }
        };

        Ok(Finished {
            status,
            stdout: join_capture(stdout),
            stderr: join_capture(stderr),
        })
    }
}

impl CommandExecutor for LocalExecutor {
    fn execute(&self, request: &ExecRequest) -> ExecResponse {
        let finished = match self.run(request) {
            Ok(finished) => finished,
            Err(error) => {
                warn!(command = %request.command, %error, "command did not run to completion");
                return ExecResponse::from_error(&request.command, &error);
            }
        };

        let stdout = String::from_utf8_lossy(&finished.stdout.bytes).into_owned();
        let mut stderr = String::from_utf8_lossy(&finished.stderr.bytes).into_owned();
        let overflowed = finished.stdout.overflowed || finished.stderr.overflowed;

        if finished.status.success() && !overflowed {
            debug!(command = %request.command, stdout_bytes = stdout.len(), "command succeeded");
            return ExecResponse::succeeded(&request.command, stdout);
        }

        if stderr.is_empty() {
            stderr = format!("Command failed: {}", request.command);
        }
        let mut response =
            ExecResponse::failed(&request.command, stdout, stderr, finished.status.code());
        if overflowed {
            response.error = Some(format!("output exceeded {} bytes", self.max_output_bytes));
        }
        warn!(
            command = %request.command,
            code = ?response.exit_code,
            overflowed,
            "command failed"
        );
        response
    }
}

/// Drains a pipe on its own thread so a chatty child never blocks on a full pipe.
/// Keeps at most `limit` bytes and discards the rest.
fn spawn_capture(
    name: &str,
    pipe: Option<impl Read + Send + 'static>,
    limit: usize,
) -> Option<JoinHandle<CapturedOutput>> {
    let mut pipe = pipe?;
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe
                .by_ref()
                .take(u64::try_from(limit).unwrap_or(u64::MAX))
                .read_to_end(&mut bytes);
            let discarded = io::copy(&mut pipe, &mut io::sink()).unwrap_or(0);
            CapturedOutput {
                bytes,
                overflowed: discarded > 0,
            }
        })
        .ok()
}

fn join_capture(handle: Option<JoinHandle<CapturedOutput>>) -> CapturedOutput {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or(CapturedOutput {
            bytes: Vec::new(),
            overflowed: false,
        })
}
