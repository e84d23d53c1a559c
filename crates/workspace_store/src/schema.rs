use command_exec::ExecResponse;
use serde::{Deserialize, Serialize};

/// One line of the execution-result log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRecord {
    pub workspace_id: String,
    pub command: String,
    /// RFC3339 UTC time the result was recorded.
    pub ts: String,
    pub result: ExecResponse,
}
