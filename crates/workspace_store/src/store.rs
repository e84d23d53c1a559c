use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use agent_workspace::WorkspaceSnapshot;
use command_exec::ExecResponse;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::error::WorkspaceStoreError;
use crate::paths::{snapshot_file_name, store_root, temp_file_name, EXEC_LOG_FILE};
use crate::schema::ExecRecord;

/// On-disk home of one workspace: its latest snapshot plus its execution results.
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    root: PathBuf,
    workspace_id: String,
}

impl WorkspaceStore {
    /// Allocates a fresh workspace id under `base`.
    pub fn create_new(base: &Path) -> Result<Self, WorkspaceStoreError> {
        let store = Self {
            root: store_root(base),
            workspace_id: Uuid::new_v4().to_string(),
        };
        store.ensure_root()?;
        debug!(
            workspace_id = %store.workspace_id,
            root = %store.root.display(),
            "created workspace store"
        );
        Ok(store)
    }

    /// Opens an existing (or not yet saved) workspace by id.
    pub fn open(base: &Path, workspace_id: &str) -> Result<Self, WorkspaceStoreError> {
        let parsed = Uuid::parse_str(workspace_id).map_err(|_| {
            WorkspaceStoreError::InvalidWorkspaceId {
                id: workspace_id.to_string(),
            }
        })?;
        let store = Self {
            root: store_root(base),
            workspace_id: parsed.to_string(),
        };
        store.ensure_root()?;
        Ok(store)
    }

    /// Ids of every saved snapshot under `base`, sorted.
    pub fn list(base: &Path) -> Result<Vec<String>, WorkspaceStoreError> {
        let root = store_root(base);
        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(WorkspaceStoreError::io("listing workspaces", &root, source));
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|source| WorkspaceStoreError::io("listing workspaces", &root, source))?;
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|name| name.strip_suffix(".json")) else {
                continue;
            };
            if Uuid::parse_str(id).is_ok() {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    #[must_use]
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(snapshot_file_name(&self.workspace_id))
    }

    #[must_use]
    pub fn exec_log_path(&self) -> PathBuf {
        self.root.join(EXEC_LOG_FILE)
    }

    /// Replaces the stored snapshot. Readers see either the old or the new file,
    /// never a partial write.
    pub fn save_snapshot(&self, snapshot: &WorkspaceSnapshot) -> Result<(), WorkspaceStoreError> {
        let path = self.snapshot_path();
        let temp_path = self.root.join(temp_file_name(&self.workspace_id));
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|source| WorkspaceStoreError::json_serialize(&path, source))?;

        let mut file = File::create(&temp_path).map_err(|source| {
            WorkspaceStoreError::io("creating snapshot temp file", &temp_path, source)
        })?;
        file.write_all(&bytes)
            .and_then(|()| file.sync_all())
            .map_err(|source| {
                WorkspaceStoreError::io("writing snapshot temp file", &temp_path, source)
            })?;
        drop(file);

        fs::rename(&temp_path, &path)
            .map_err(|source| WorkspaceStoreError::io("replacing snapshot", &path, source))?;
        debug!(
            workspace_id = %self.workspace_id,
            files = snapshot.file_count(),
            "saved workspace snapshot"
        );
        Ok(())
    }

    /// Loads the stored snapshot; `None` when nothing was saved yet.
    pub fn load_snapshot(&self) -> Result<Option<WorkspaceSnapshot>, WorkspaceStoreError> {
        let path = self.snapshot_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(WorkspaceStoreError::io("reading snapshot", &path, source)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| WorkspaceStoreError::SnapshotParse { path, source })
    }

    /// Appends one result to the shared execution log.
    pub fn append_exec_result(
        &self,
        result: &ExecResponse,
    ) -> Result<ExecRecord, WorkspaceStoreError> {
        let path = self.exec_log_path();
        let record = ExecRecord {
            workspace_id: self.workspace_id.clone(),
            command: result.command.clone(),
            ts: now_rfc3339()?,
            result: result.clone(),
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|source| WorkspaceStoreError::json_serialize(&path, source))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| {
                WorkspaceStoreError::io("opening exec log for append", &path, source)
            })?;
        file.write_all(line.as_bytes())
            .map_err(|source| WorkspaceStoreError::io("appending exec result", &path, source))?;

        Ok(record)
    }

    /// This workspace's logged results, oldest first.
    pub fn exec_results(&self) -> Result<Vec<ExecRecord>, WorkspaceStoreError> {
        let path = self.exec_log_path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(WorkspaceStoreError::io("opening exec log", &path, source)),
        };

        let mut records = Vec::new();
        for (line_index, line_result) in BufReader::new(file).lines().enumerate() {
            let line_number = line_index + 1;
            let line = line_result
                .map_err(|source| WorkspaceStoreError::io_line(&path, line_number, source))?;
            if line.trim().is_empty() {
                continue;
            }

            let record = serde_json::from_str::<ExecRecord>(&line)
                .map_err(|source| WorkspaceStoreError::json_line(&path, line_number, source))?;
            if OffsetDateTime::parse(&record.ts, &Rfc3339).is_err() {
                return Err(WorkspaceStoreError::InvalidTimestamp {
                    path,
                    line: line_number,
                    value: record.ts,
                });
            }
            if record.workspace_id == self.workspace_id {
                records.push(record);
            }
        }

        Ok(records)
    }

    fn ensure_root(&self) -> Result<(), WorkspaceStoreError> {
        fs::create_dir_all(&self.root).map_err(|source| {
            WorkspaceStoreError::io("creating store directory", &self.root, source)
        })
    }
}

fn now_rfc3339() -> Result<String, WorkspaceStoreError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(WorkspaceStoreError::ClockFormat)
}
