use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Folder,
}

/// Entry in the virtual tree. `id` is the full path and unique within a tree.
///
/// Invariant: every child of a folder has `id == parent.id + "/" + name`; files
/// have no children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
}

impl FileNode {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Depth-first search for `id` in this subtree.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&FileNode> {
        if self.id == id {
            return Some(self);
        }

        self.children.iter().find_map(|child| child.find(id))
    }

    /// Pre-order walk over this subtree.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a FileNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}
