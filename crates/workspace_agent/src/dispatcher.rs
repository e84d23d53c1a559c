//! Snapshot-driven command dispatch.
//!
//! The dispatcher sees the assistant message as a sequence of growing snapshots. For
//! each one it feeds only the unseen suffix to the message's [`CommandExtractor`],
//! fingerprints the returned batch and applies it at most once per message. `<exe>`
//! commands run on their own threads; their results come back through
//! [`ExecutionHandle`] and never feed back into parsing or projection.
//!
//! A snapshot that does not extend the text seen so far is rescanned from the start.
//! The rescan's leading commands that match what the message already emitted, in
//! order, are replays and are dropped; only the rest is dispatched.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use agent_provider::{MessageSnapshot, Role, RunId};
use agent_workspace::{strip_command_tags, BatchFingerprint, Command, CommandExtractor, Workspace};
use command_exec::{CommandExecutor, ExecRequest, ExecResponse};
use tracing::{debug, info, warn};
use workspace_store::WorkspaceStore;

use crate::error::RuntimeError;
use crate::lock_unpoisoned;

/// Display text for a finalized reply: the prose with every complete tag removed, or
/// a confirmation when only commands were sent.
pub fn display_text(final_text: &str, applied: usize) -> String {
    let visible = strip_command_tags(final_text);
    if visible.is_empty() && applied > 0 {
        format!("✓ Applied {applied} command(s)")
    } else {
        visible
    }
}

struct MessageState {
    run_id: RunId,
    extractor: CommandExtractor,
    seen: HashSet<BatchFingerprint>,
    /// Every command the extractor returned for this message, in text order.
    emitted: Vec<Command>,
    observed: String,
    applied: usize,
}

impl MessageState {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            extractor: CommandExtractor::new(),
            seen: HashSet::new(),
            emitted: Vec::new(),
            observed: String::new(),
            applied: 0,
        }
    }
}

/// What one snapshot produced.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Commands applied by new batches.
    pub applied: usize,
    /// Batches dropped because the message already applied the same fingerprint.
    pub suppressed: usize,
    pub executions: Vec<ExecutionHandle>,
    /// Set once, on the closing snapshot.
    pub display_text: Option<String>,
}

pub struct Dispatcher {
    workspace: Arc<Mutex<Workspace>>,
    executor: Option<Arc<dyn CommandExecutor>>,
    store: Option<Arc<WorkspaceStore>>,
    message: Option<MessageState>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("executor", &self.executor.is_some())
            .field("store", &self.store.as_ref().map(|store| store.workspace_id()))
            .field("message", &self.message.as_ref().map(|state| state.run_id))
            .finish()
    }
}

impl Dispatcher {
    /// Dispatcher with execution and persistence switched off.
    pub fn new(workspace: Arc<Mutex<Workspace>>) -> Self {
        Self {
            workspace,
            executor: None,
            store: None,
            message: None,
        }
    }

    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<WorkspaceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn workspace(&self) -> &Arc<Mutex<Workspace>> {
        &self.workspace
    }

    /// Run whose dedup state is currently held, if any.
    pub fn current_run(&self) -> Option<RunId> {
        self.message.as_ref().map(|state| state.run_id)
    }

    pub fn on_snapshot(&mut self, snapshot: &MessageSnapshot) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        if snapshot.role != Role::Assistant {
            return outcome;
        }

        let run_id = snapshot.run_id;
        let mut state = match self.message.take() {
            Some(state) if state.run_id == run_id => state,
            Some(stale) => {
                debug!(
                    stale_run = stale.run_id,
                    run_id,
                    "dropping dedup state of superseded message"
                );
                MessageState::new(run_id)
            }
            None => MessageState::new(run_id),
        };

        let (delta, rescan) = match snapshot.text.strip_prefix(state.observed.as_str()) {
            Some(delta) => (delta, false),
            None => {
                warn!(
                    run_id,
                    observed = state.observed.len(),
                    received = snapshot.text.len(),
                    "message text no longer extends what was seen; rescanning"
                );
                state.extractor.reset();
                (snapshot.text.as_str(), true)
            }
        };

        let mut batch = state.extractor.parse(delta);
        if rescan {
            let replayed = batch
                .iter()
                .zip(&state.emitted)
                .take_while(|(rescanned, emitted)| rescanned == emitted)
                .count();
            if replayed > 0 {
                debug!(run_id, replayed, "dropping commands replayed by rescan");
                outcome.suppressed += 1;
            }
            state.emitted.truncate(replayed);
            batch.drain(..replayed);
        }
        state.emitted.extend(batch.iter().cloned());
        state.observed.clear();
        state.observed.push_str(&snapshot.text);
        self.dispatch_batch(&mut state, batch, &mut outcome);

        if snapshot.streaming {
            self.message = Some(state);
            return outcome;
        }

        let tail = state.extractor.finish();
        self.dispatch_batch(&mut state, tail, &mut outcome);

        let text = display_text(&snapshot.text, state.applied);
        info!(
            run_id,
            applied = state.applied,
            batches = state.seen.len(),
            "finalized assistant message"
        );
        outcome.display_text = Some(text);
        outcome
    }

    /// Forgets the message of `run_id` without finalizing it. Projected state stays.
    pub fn abandon(&mut self, run_id: RunId) {
        if self.current_run() != Some(run_id) {
            return;
        }

        if let Some(state) = self.message.take() {
            debug!(
                run_id,
                applied = state.applied,
                buffered = state.extractor.buffer().len(),
                "abandoned message without finalizing"
            );
        }
    }

    fn dispatch_batch(
        &self,
        state: &mut MessageState,
        batch: Vec<Command>,
        outcome: &mut DispatchOutcome,
    ) {
        if batch.is_empty() {
            return;
        }

        let fingerprint = BatchFingerprint::of(&batch);
        if !state.seen.insert(fingerprint) {
            debug!(run_id = state.run_id, %fingerprint, "suppressing replayed batch");
            outcome.suppressed += 1;
            return;
        }

        let snapshot = {
            let mut workspace = lock_unpoisoned(&self.workspace);
            let report = workspace.apply_commands(&batch);
            debug!(
                run_id = state.run_id,
                %fingerprint,
                commands = batch.len(),
                created = report.created.len(),
                written = report.written.len(),
                skipped = report.skipped,
                "applied batch"
            );
            self.store.as_ref().map(|_| workspace.snapshot())
        };

        if let (Some(store), Some(snapshot)) = (self.store.as_ref(), snapshot) {
            if let Err(error) = store.save_snapshot(&snapshot) {
                warn!(
                    %error,
                    workspace_id = store.workspace_id(),
                    "failed to persist workspace snapshot"
                );
            }
        }

        state.applied += batch.len();
        outcome.applied += batch.len();

        for command in &batch {
            if let Command::Execute { command } = command {
                if let Some(handle) = self.spawn_execution(command) {
                    outcome.executions.push(handle);
                }
            }
        }
    }

    fn spawn_execution(&self, command: &str) -> Option<ExecutionHandle> {
        let Some(executor) = self.executor.as_ref() else {
            debug!(command, "execution disabled; skipping command");
            return None;
        };

        let executor = Arc::clone(executor);
        let store = self.store.clone();
        let request = ExecRequest::new(command);
        let spawned = thread::Builder::new()
            .name("workspace-exec".to_string())
            .spawn(move || run_execution(executor.as_ref(), store.as_deref(), &request));

        let state = match spawned {
            Ok(join_handle) => ExecutionState::Running(join_handle),
            Err(source) => {
                let error = RuntimeError::SpawnWorker {
                    what: "execution",
                    source,
                };
                warn!(%error, command, "execution not started");
                ExecutionState::Ready(ExecResponse::failed(command, "", error.to_string(), None))
            }
        };

        Some(ExecutionHandle {
            command: command.to_string(),
            state,
        })
    }
}

fn run_execution(
    executor: &dyn CommandExecutor,
    store: Option<&WorkspaceStore>,
    request: &ExecRequest,
) -> ExecResponse {
    info!(command = %request.command, "executing command");
    let response = executor.execute(request);

    if response.success {
        info!(command = %request.command, code = ?response.exit_code, "command succeeded");
    } else {
        warn!(
            command = %request.command,
            code = ?response.exit_code,
            error = ?response.error,
            stderr = %response.stderr,
            "command failed"
        );
    }

    if let Some(store) = store {
        if let Err(error) = store.append_exec_result(&response) {
            warn!(%error, "failed to log execution result");
        }
    }

    response
}

#[derive(Debug)]
enum ExecutionState {
    Running(JoinHandle<ExecResponse>),
    Ready(ExecResponse),
}

/// Completion handle for one `<exe>` command.
#[derive(Debug)]
pub struct ExecutionHandle {
    command: String,
    state: ExecutionState,
}

impl ExecutionHandle {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            ExecutionState::Running(join_handle) => join_handle.is_finished(),
            ExecutionState::Ready(_) => true,
        }
    }

    /// Blocks until the command completes. Command failures are an `Ok` response with
    /// `success == false`; `Err` means the worker itself died.
    pub fn wait(self) -> Result<ExecResponse, RuntimeError> {
        let Self { command, state } = self;
        match state {
            ExecutionState::Ready(response) => Ok(response),
            ExecutionState::Running(join_handle) => join_handle
                .join()
                .map_err(|_| RuntimeError::ExecutionPanicked { command }),
        }
    }
}
