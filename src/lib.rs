//! Streaming command protocol for agent-driven workspaces.
//!
//! An agent reply is prose interleaved with three command tags:
//!
//! - `<makef path="P"/>` (or `<makef path="P">…</makef>`) declares a path;
//! - `<writf path="P">content</writf>` replaces the content of a file;
//! - `<exe>command</exe>` requests a shell command.
//!
//! Invariant: the reply arrives in arbitrary chunks. [`CommandExtractor`] emits each
//! complete tag exactly once no matter where chunk boundaries fall, and
//! [`Workspace::apply_commands`] projects the decoded [`Command`]s onto a virtual file
//! tree where re-creating a path is a no-op and later writes win.
//!
//! # Public API Overview
//! - Incremental extraction: [`CommandExtractor::parse`] / [`CommandExtractor::finish`].
//! - Final display text: [`strip_command_tags`].
//! - Batch identity for replay suppression: [`BatchFingerprint`].
//! - Projection and view state: [`Workspace`], [`FileNode`], [`WorkspaceSnapshot`].

pub mod protocol;
pub mod workspace;

pub use crate::protocol::command::Command;
pub use crate::protocol::extractor::{extract_all, CommandExtractor};
pub use crate::protocol::fingerprint::BatchFingerprint;
pub use crate::protocol::grammar::TagKind;
pub use crate::protocol::strip::strip_command_tags;
pub use crate::workspace::node::{FileNode, NodeKind};
pub use crate::workspace::path::normalize_path;
pub use crate::workspace::projector::{ApplyReport, Workspace};
pub use crate::workspace::snapshot::WorkspaceSnapshot;
