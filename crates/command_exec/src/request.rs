use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// One command execution request, in the `/api/exec` wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecRequest {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default, rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ExecRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            workdir: None,
            timeout_ms: None,
        }
    }

    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Fills unset (or blank/zero) fields from the given defaults.
    #[must_use]
    pub fn resolved(&self, default_workdir: &str, default_timeout_ms: u64) -> Self {
        let workdir = self
            .workdir
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(default_workdir);
        let timeout_ms = self
            .timeout_ms
            .filter(|value| *value > 0)
            .unwrap_or(default_timeout_ms);

        Self {
            command: self.command.clone(),
            workdir: Some(workdir.to_string()),
            timeout_ms: Some(timeout_ms),
        }
    }
}

/// Outcome of one execution, in the `/api/exec` wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResponse {
    pub success: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub command: String,
    #[serde(default, rename = "code", skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecResponse {
    pub fn succeeded(command: impl Into<String>, stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
            command: command.into(),
            exit_code: None,
            error: None,
        }
    }

    /// A command that ran (or tried to) and did not succeed. `code` is `-1` when
    /// there is no exit status.
    pub fn failed(
        command: impl Into<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        code: Option<i32>,
    ) -> Self {
        Self {
            success: false,
            stdout: stdout.into(),
            stderr: stderr.into(),
            command: command.into(),
            exit_code: Some(code.unwrap_or(-1)),
            error: None,
        }
    }

    /// A request that never reached a shell.
    pub fn from_error(command: impl Into<String>, error: &ExecError) -> Self {
        Self::failed(command, "", error.to_string(), None)
    }

    /// A request that could not be delivered to a remote executor.
    pub fn transport_failure(command: impl Into<String>, error: &ExecError) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: error.to_string(),
            command: command.into(),
            exit_code: None,
            error: Some("Failed to execute command".to_string()),
        }
    }
}
