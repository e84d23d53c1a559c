use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceStoreError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while reading line {line} in {path}: {source}")]
    IoLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse snapshot {path}: {source}")]
    SnapshotParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse JSON at {path}:{line}: {source}")]
    JsonLineParse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize record for {path}: {source}")]
    JsonSerialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line} in {path} has invalid RFC3339 timestamp: {value}")]
    InvalidTimestamp {
        path: PathBuf,
        line: usize,
        value: String,
    },

    #[error("workspace id '{id}' is not a UUID")]
    InvalidWorkspaceId { id: String },

    #[error("failed to format current UTC timestamp as RFC3339: {0}")]
    ClockFormat(#[source] time::error::Format),
}

impl WorkspaceStoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn io_line(path: impl Into<PathBuf>, line: usize, source: std::io::Error) -> Self {
        Self::IoLine {
            path: path.into(),
            line,
            source,
        }
    }

    #[must_use]
    pub fn json_line(path: impl Into<PathBuf>, line: usize, source: serde_json::Error) -> Self {
        Self::JsonLineParse {
            path: path.into(),
            line,
            source,
        }
    }

    #[must_use]
    pub fn json_serialize(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::JsonSerialize {
            path: path.into(),
            source,
        }
    }
}
