//! Virtual workspace: file tree, contents, and editor view state driven by commands.

pub mod node;
pub mod path;
pub mod projector;
pub mod snapshot;
