use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::protocol::command::Command;
use crate::workspace::node::{FileNode, NodeKind};
use crate::workspace::path::{join_segments, normalize_path};
use crate::workspace::snapshot::WorkspaceSnapshot;

/// What one [`Workspace::apply_commands`] call changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    /// Node ids created by this batch, in creation order.
    pub created: Vec<String>,
    /// File ids whose content was written, in command order (repeats kept).
    pub written: Vec<String>,
    /// `Execute` commands seen; they have no effect on the tree.
    pub executions: usize,
    /// Commands skipped because their path was empty or unusable.
    pub skipped: usize,
}

impl ApplyReport {
    #[must_use]
    pub fn changed_tree(&self) -> bool {
        !self.created.is_empty() || !self.written.is_empty()
    }
}

/// Virtual workspace projected from agent commands.
///
/// Owns the folder/file tree, the flat content map, the expanded-folder set and the
/// editor tabs. Nodes are created lazily and never removed by command application.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Workspace {
    tree: Vec<FileNode>,
    contents: BTreeMap<String, String>,
    expanded: BTreeSet<String>,
    open_tabs: Vec<String>,
    active_file: Option<String>,
}

impl Workspace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one batch strictly in input order.
    ///
    /// Re-creating an existing path is a no-op; later writes to the same path win.
    pub fn apply_commands(&mut self, commands: &[Command]) -> ApplyReport {
        let mut report = ApplyReport::default();

        for command in commands {
            match command {
                Command::CreatePath { path } => {
                    let segments = normalize_path(path);
                    if segments.is_empty() {
                        warn!(path = %path, "skipping makef with empty path");
                        report.skipped += 1;
                        continue;
                    }
                    self.ensure_file(&segments, &mut report.created);
                }
                Command::WriteFile { path, content } => {
                    let segments = normalize_path(path);
                    if segments.is_empty() {
                        warn!(path = %path, "skipping writf with empty path");
                        report.skipped += 1;
                        continue;
                    }

                    let Some(id) = self.ensure_file(&segments, &mut report.created) else {
                        report.skipped += 1;
                        continue;
                    };
                    self.contents.insert(id.clone(), content.clone());
                    self.focus(&id);
                    report.written.push(id);
                }
                Command::Execute { .. } => report.executions += 1,
            }
        }

        debug!(
            created = report.created.len(),
            written = report.written.len(),
            executions = report.executions,
            skipped = report.skipped,
            "applied command batch"
        );
        report
    }

    /// Walks the segments, creating missing folders and a leaf file.
    ///
    /// Every intermediate folder is expanded. Returns the leaf id, or `None` when the
    /// leaf already exists as a folder (a folder cannot hold content).
    fn ensure_file(&mut self, segments: &[&str], created: &mut Vec<String>) -> Option<String> {
        let Self {
            tree,
            contents,
            expanded,
            open_tabs,
            active_file,
        } = self;
        let last = segments.len() - 1;
        let mut level = tree;

        for (index, segment) in segments.iter().enumerate() {
            let id = join_segments(&segments[..=index]);
            let is_leaf = index == last;

            let position = match level.iter().position(|node| node.name == *segment) {
                Some(position) => position,
                None => {
                    let kind = if is_leaf {
                        NodeKind::File
                    } else {
                        NodeKind::Folder
                    };
                    level.push(FileNode::new(id.clone(), *segment, kind));
                    created.push(id.clone());
                    level.len() - 1
                }
            };
            let node = &mut level[position];

            if is_leaf {
                if node.is_folder() {
                    warn!(path = %id, "path names an existing folder; not a file");
                    return None;
                }
                return Some(id);
            }

            if !node.is_folder() {
                // A deeper path wins over an earlier leaf declaration.
                warn!(path = %id, "promoting file to folder for nested path");
                node.kind = NodeKind::Folder;
                contents.remove(&id);
                open_tabs.retain(|tab| *tab != id);
                if active_file.as_deref() == Some(id.as_str()) {
                    *active_file = open_tabs.last().cloned();
                }
            }
            expanded.insert(id);
            level = &mut node.children;
        }

        None
    }

    fn focus(&mut self, id: &str) {
        self.active_file = Some(id.to_string());
        if !self.open_tabs.iter().any(|tab| tab == id) {
            self.open_tabs.push(id.to_string());
        }
    }

    /// Focuses `file_id` (adding a tab for it) or clears focus.
    pub fn set_active_file(&mut self, file_id: Option<&str>) {
        match file_id {
            Some(id) => self.focus(id),
            None => self.active_file = None,
        }
    }

    /// Flips whether `folder_id` is expanded.
    pub fn toggle_folder(&mut self, folder_id: &str) {
        if !self.expanded.remove(folder_id) {
            self.expanded.insert(folder_id.to_string());
        }
    }

    /// Closes a tab; closing the active tab focuses the last remaining one.
    pub fn close_tab(&mut self, file_id: &str) {
        self.open_tabs.retain(|tab| tab != file_id);
        if self.active_file.as_deref() == Some(file_id) {
            self.active_file = self.open_tabs.last().cloned();
        }
    }

    /// Content of `file_id`, or an empty string for unknown or never-written files.
    #[must_use]
    pub fn file_content(&self, file_id: &str) -> &str {
        self.contents.get(file_id).map_or("", String::as_str)
    }

    #[must_use]
    pub fn find_node(&self, id: &str) -> Option<&FileNode> {
        self.tree.iter().find_map(|node| node.find(id))
    }

    /// Every node id in pre-order.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        for node in &self.tree {
            node.walk(&mut |visited| ids.push(visited.id.as_str()));
        }
        ids
    }

    #[must_use]
    pub fn tree(&self) -> &[FileNode] {
        &self.tree
    }

    #[must_use]
    pub fn contents(&self) -> &BTreeMap<String, String> {
        &self.contents
    }

    #[must_use]
    pub fn is_expanded(&self, folder_id: &str) -> bool {
        self.expanded.contains(folder_id)
    }

    #[must_use]
    pub fn expanded_folders(&self) -> &BTreeSet<String> {
        &self.expanded
    }

    #[must_use]
    pub fn open_tabs(&self) -> &[String] {
        &self.open_tabs
    }

    #[must_use]
    pub fn active_file(&self) -> Option<&str> {
        self.active_file.as_deref()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Full serializable state, consistent at batch granularity.
    #[must_use]
    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            tree: self.tree.clone(),
            contents: self.contents.clone(),
            expanded_folders: self.expanded.iter().cloned().collect(),
            open_tabs: self.open_tabs.clone(),
            active_file: self.active_file.clone(),
        }
    }

    #[must_use]
    pub fn from_snapshot(snapshot: WorkspaceSnapshot) -> Self {
        Self {
            tree: snapshot.tree,
            contents: snapshot.contents,
            expanded: snapshot.expanded_folders.into_iter().collect(),
            open_tabs: snapshot.open_tabs,
            active_file: snapshot.active_file,
        }
    }
}
