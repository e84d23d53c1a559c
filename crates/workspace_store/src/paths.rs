use std::path::{Path, PathBuf};

pub const STORE_DIR: [&str; 2] = [".agent", "workspaces"];

/// Shared append-only log of execution results for every workspace under a root.
pub const EXEC_LOG_FILE: &str = "exec_results.jsonl";

#[must_use]
pub fn store_root(base: &Path) -> PathBuf {
    base.join(STORE_DIR[0]).join(STORE_DIR[1])
}

#[must_use]
pub fn snapshot_file_name(workspace_id: &str) -> String {
    format!("{workspace_id}.json")
}

/// Sibling used for write-then-rename.
#[must_use]
pub(crate) fn temp_file_name(workspace_id: &str) -> String {
    format!(".{workspace_id}.json.tmp")
}
