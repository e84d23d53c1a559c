use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::workspace::node::FileNode;

/// Serializable copy of a [`crate::Workspace`], offered to persistence after each batch.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceSnapshot {
    pub tree: Vec<FileNode>,
    pub contents: BTreeMap<String, String>,
    /// Sorted folder ids.
    pub expanded_folders: Vec<String>,
    pub open_tabs: Vec<String>,
    pub active_file: Option<String>,
}

impl WorkspaceSnapshot {
    #[must_use]
    pub fn file_count(&self) -> usize {
        let mut count = 0;
        for node in &self.tree {
            node.walk(&mut |visited| {
                if !visited.is_folder() {
                    count += 1;
                }
            });
        }
        count
    }
}
