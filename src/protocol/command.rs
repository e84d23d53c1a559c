use std::fmt;

use crate::protocol::grammar::{TagKind, TagMatch};

/// One decoded instruction extracted from agent text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// A file or folder should exist at `path`; no content implied.
    CreatePath { path: String },
    /// Full replacement of the content of `path`.
    WriteFile { path: String, content: String },
    /// Opaque shell command for the external executor.
    Execute { command: String },
}

impl Command {
    pub(crate) fn from_match(found: &TagMatch<'_>) -> Self {
        let path = found.path.unwrap_or_default().to_string();
        let body = found.body.map(str::trim).unwrap_or_default().to_string();

        match found.kind {
            TagKind::MakeFile => Self::CreatePath { path },
            TagKind::WriteFile => Self::WriteFile {
                path,
                content: body,
            },
            TagKind::Exec => Self::Execute { command: body },
        }
    }

    #[must_use]
    pub fn kind(&self) -> TagKind {
        match self {
            Self::CreatePath { .. } => TagKind::MakeFile,
            Self::WriteFile { .. } => TagKind::WriteFile,
            Self::Execute { .. } => TagKind::Exec,
        }
    }

    /// Target path for file commands, `None` for executions.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::CreatePath { path } | Self::WriteFile { path, .. } => Some(path),
            Self::Execute { .. } => None,
        }
    }

    #[must_use]
    pub fn is_execute(&self) -> bool {
        matches!(self, Self::Execute { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatePath { path } => write!(f, "makef {path}"),
            Self::WriteFile { path, content } => {
                write!(f, "writf {path} ({} bytes)", content.len())
            }
            Self::Execute { command } => write!(f, "exe {command}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Command;
    use crate::protocol::grammar::TagKind;

    #[test]
    fn accessors_follow_variant() {
        let create = Command::CreatePath {
            path: "a.txt".to_string(),
        };
        let exec = Command::Execute {
            command: "bun install".to_string(),
        };

        assert_eq!(create.kind(), TagKind::MakeFile);
        assert_eq!(create.path(), Some("a.txt"));
        assert!(!create.is_execute());
        assert_eq!(exec.path(), None);
        assert!(exec.is_execute());
    }

    #[test]
    fn display_is_compact_and_omits_content() {
        let write = Command::WriteFile {
            path: "src/main.ts".to_string(),
            content: "hello".to_string(),
        };
        assert_eq!(write.to_string(), "writf src/main.ts (5 bytes)");
    }
}
