use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use agent_provider::{
    CancelSignal, MessageSnapshot, ProviderProfile, RunEvent, RunId, RunProvider, RunRequest,
};
use agent_workspace::Workspace;
use tracing::{debug, error, info};

use crate::dispatcher::{Dispatcher, ExecutionHandle};
use crate::error::RuntimeError;
use crate::lock_unpoisoned;
use crate::transcript::{Mode, Transcript};

const IDLE_POLL: Duration = Duration::from_millis(50);

struct ActiveRun {
    run_id: RunId,
    cancel: CancelSignal,
    join_handle: Option<JoinHandle<()>>,
}

struct SessionState {
    transcript: Transcript,
    dispatcher: Dispatcher,
    reply: Option<(RunId, String)>,
    executions: Vec<ExecutionHandle>,
}

impl SessionState {
    fn apply(&mut self, event: RunEvent) {
        match event {
            RunEvent::Started { run_id } => {
                if self.transcript.active_run() != Some(run_id) {
                    return;
                }
                self.reply = Some((run_id, String::new()));
                self.transcript.on_run_started(run_id);
            }
            RunEvent::Delta { run_id, text } => {
                let snapshot = match self.reply_mut(run_id) {
                    Some(reply) => {
                        reply.push_str(&text);
                        MessageSnapshot::streaming(run_id, reply.clone())
                    }
                    None => return,
                };
                self.transcript.on_run_chunk(run_id, &text);
                let outcome = self.dispatcher.on_snapshot(&snapshot);
                self.executions.extend(outcome.executions);
            }
            RunEvent::Finished { run_id } => {
                if self.transcript.active_run() != Some(run_id) {
                    return;
                }
                let snapshot = MessageSnapshot::closed(run_id, self.take_reply(run_id));
                let outcome = self.dispatcher.on_snapshot(&snapshot);
                self.executions.extend(outcome.executions);
                let display_text = outcome.display_text.unwrap_or_default();
                info!(run_id, reply_len = snapshot.text.len(), "run finished");
                self.transcript
                    .on_run_finished(run_id, &snapshot.text, display_text);
            }
            RunEvent::Failed { run_id, error } => {
                if self.transcript.active_run() != Some(run_id) {
                    return;
                }
                let partial = self.take_reply(run_id);
                self.dispatcher.abandon(run_id);
                error!(
                    run_id,
                    %error,
                    partial_len = partial.len(),
                    "run failed; message abandoned"
                );
                self.transcript.on_run_failed(run_id, &error);
            }
            RunEvent::Cancelled { run_id } => {
                if self.transcript.active_run() != Some(run_id) {
                    return;
                }
                let partial = self.take_reply(run_id);
                self.dispatcher.abandon(run_id);
                info!(run_id, partial_len = partial.len(), "run cancelled");
                self.transcript.on_run_cancelled(run_id);
            }
        }
    }

    fn reply_mut(&mut self, run_id: RunId) -> Option<&mut String> {
        if self.transcript.active_run() != Some(run_id) {
            return None;
        }
        if self.reply.as_ref().map(|(current, _)| *current) != Some(run_id) {
            self.reply = Some((run_id, String::new()));
        }
        self.reply.as_mut().map(|(_, text)| text)
    }

    fn take_reply(&mut self, run_id: RunId) -> String {
        match self.reply.take() {
            Some((current, text)) if current == run_id => text,
            other => {
                self.reply = other;
                String::new()
            }
        }
    }
}

/// One agent session: a transcript, a dispatcher over the shared workspace and at
/// most one provider run at a time.
///
/// Provider events are queued by the run worker and applied in order by whichever
/// thread drains the queue ([`SessionRuntime::flush_pending_run_events`] or
/// [`SessionRuntime::wait_until_idle`]).
pub struct SessionRuntime {
    state: Mutex<SessionState>,
    pending_events: Mutex<VecDeque<RunEvent>>,
    events_ready: Condvar,
    drain_lock: Mutex<()>,
    next_run_id: AtomicU64,
    active_run: Mutex<Option<ActiveRun>>,
    provider: Arc<dyn RunProvider>,
}

impl SessionRuntime {
    pub fn new(
        provider: Arc<dyn RunProvider>,
        dispatcher: Dispatcher,
        transcript: Transcript,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SessionState {
                transcript,
                dispatcher,
                reply: None,
                executions: Vec::new(),
            }),
            pending_events: Mutex::new(VecDeque::new()),
            events_ready: Condvar::new(),
            drain_lock: Mutex::new(()),
            next_run_id: AtomicU64::new(1),
            active_run: Mutex::new(None),
            provider,
        })
    }

    pub fn profile(&self) -> ProviderProfile {
        self.provider.profile()
    }

    /// Starts a run for `prompt` on a worker thread.
    pub fn start_run(self: &Arc<Self>, prompt: &str) -> Result<RunId, RuntimeError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(RuntimeError::EmptyPrompt);
        }

        let mut active_run = self.lock_active_run();
        if let Some(active) = active_run.as_ref() {
            return Err(RuntimeError::RunAlreadyActive {
                run_id: active.run_id,
            });
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let request = {
            let mut state = lock_unpoisoned(&self.state);
            RunRequest {
                run_id,
                messages: state.transcript.begin_turn(run_id, prompt),
                instructions: state.transcript.system_prompt().to_string(),
            }
        };

        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let join_handle = match self.spawn_worker(request, Arc::clone(&cancel)) {
            Ok(join_handle) => join_handle,
            Err(spawn_error) => {
                lock_unpoisoned(&self.state)
                    .transcript
                    .rollback_turn(&spawn_error.to_string());
                return Err(spawn_error);
            }
        };

        info!(run_id, provider = %self.provider.profile().provider_id, "run started");
        *active_run = Some(ActiveRun {
            run_id,
            cancel,
            join_handle: Some(join_handle),
        });

        Ok(run_id)
    }

    /// Starts a run and blocks until its terminal event has been applied.
    pub fn run_turn(self: &Arc<Self>, prompt: &str) -> Result<RunId, RuntimeError> {
        let run_id = self.start_run(prompt)?;
        self.wait_until_idle();
        Ok(run_id)
    }

    /// Requests cancellation of the active run. Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        let active_run = self.lock_active_run();
        match active_run.as_ref() {
            Some(active) => {
                debug!(run_id = active.run_id, "cancellation requested");
                active.cancel.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn cancel_run(&self, run_id: RunId) {
        let active_run = self.lock_active_run();
        if let Some(active) = active_run.as_ref() {
            if active.run_id == run_id {
                active.cancel.store(true, Ordering::SeqCst);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_active_run().is_some()
    }

    /// Applies every queued event in arrival order.
    pub fn flush_pending_run_events(&self) -> usize {
        let _drain = lock_unpoisoned(&self.drain_lock);
        let mut drained = 0usize;

        loop {
            let event = lock_unpoisoned(&self.pending_events).pop_front();
            match event {
                Some(event) => {
                    self.apply_run_event(event);
                    drained += 1;
                }
                None => break,
            }
        }

        drained
    }

    /// Drains events until no run is active.
    pub fn wait_until_idle(&self) {
        loop {
            self.flush_pending_run_events();
            if !self.is_running() {
                return;
            }

            let queue = lock_unpoisoned(&self.pending_events);
            if queue.is_empty() {
                let _ = self.events_ready.wait_timeout(queue, IDLE_POLL);
            }
        }
    }

    pub fn mode(&self) -> Mode {
        lock_unpoisoned(&self.state).transcript.mode().clone()
    }

    pub fn transcript(&self) -> Transcript {
        lock_unpoisoned(&self.state).transcript.clone()
    }

    pub fn workspace(&self) -> Arc<Mutex<Workspace>> {
        Arc::clone(lock_unpoisoned(&self.state).dispatcher.workspace())
    }

    /// Hands over the executions issued so far.
    pub fn take_executions(&self) -> Vec<ExecutionHandle> {
        std::mem::take(&mut lock_unpoisoned(&self.state).executions)
    }

    fn spawn_worker(
        self: &Arc<Self>,
        request: RunRequest,
        cancel: CancelSignal,
    ) -> Result<JoinHandle<()>, RuntimeError> {
        let run_id = request.run_id;
        let runtime = Arc::clone(self);
        thread::Builder::new()
            .name(format!("workspace-agent-run-{run_id}"))
            .spawn(move || runtime.run_worker(request, cancel))
            .map_err(|source| RuntimeError::SpawnWorker {
                what: "run",
                source,
            })
    }

    fn run_worker(self: Arc<Self>, request: RunRequest, cancel: CancelSignal) {
        let run_id = request.run_id;
        let terminal_emitted = Arc::new(AtomicBool::new(false));
        let terminal_emitted_for_emit = Arc::clone(&terminal_emitted);
        let runtime = Arc::clone(&self);
        let provider = Arc::clone(&self.provider);

        let mut emit = move |event: RunEvent| {
            if event.is_terminal() {
                terminal_emitted_for_emit.store(true, Ordering::SeqCst);
            }
            runtime.enqueue_run_event(event);
        };

        let run_outcome = catch_unwind(AssertUnwindSafe(|| {
            provider.run(request, Arc::clone(&cancel), &mut emit)
        }));

        match run_outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                if !terminal_emitted.load(Ordering::SeqCst) {
                    emit(RunEvent::Failed { run_id, error });
                }
            }
            Err(_) => emit(RunEvent::Failed {
                run_id,
                error: "Provider panicked".to_string(),
            }),
        }

        if !terminal_emitted.load(Ordering::SeqCst) && self.is_active_run_id(run_id) {
            emit(RunEvent::Failed {
                run_id,
                error: "Provider exited without terminal event".to_string(),
            });
        }
    }

    fn enqueue_run_event(&self, event: RunEvent) {
        lock_unpoisoned(&self.pending_events).push_back(event);
        self.events_ready.notify_all();
    }

    fn apply_run_event(&self, event: RunEvent) {
        let run_id = event.run_id();
        let terminal = event.is_terminal();

        lock_unpoisoned(&self.state).apply(event);

        if terminal {
            self.clear_active_run_if_matching(run_id);
        }
    }

    fn clear_active_run_if_matching(&self, run_id: RunId) {
        let mut active_run = self.lock_active_run();
        if active_run.as_ref().map(|active| active.run_id) != Some(run_id) {
            return;
        }

        let Some(mut completed) = active_run.take() else {
            return;
        };

        if let Some(join_handle) = completed.join_handle.take() {
            let is_current_thread = join_handle.thread().id() == thread::current().id();
            if !is_current_thread && join_handle.is_finished() {
                let _ = join_handle.join();
            }
        }
    }

    fn is_active_run_id(&self, run_id: RunId) -> bool {
        self.lock_active_run().as_ref().map(|active| active.run_id) == Some(run_id)
    }

    fn lock_active_run(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        lock_unpoisoned(&self.active_run)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use agent_provider::{CancelSignal, ProviderProfile, RunEvent, RunProvider, RunRequest};
    use agent_workspace::Workspace;
    use pretty_assertions::assert_eq;

    use super::SessionRuntime;
    use crate::dispatcher::Dispatcher;
    use crate::error::RuntimeError;
    use crate::transcript::{Mode, Transcript};

    struct ScriptedProvider {
        events: Box<dyn Fn(u64) -> Vec<RunEvent> + Send + Sync>,
        result: Result<(), String>,
    }

    impl RunProvider for ScriptedProvider {
        fn profile(&self) -> ProviderProfile {
            ProviderProfile {
                provider_id: "scripted".to_string(),
                model_id: "test".to_string(),
            }
        }

        fn run(
            &self,
            req: RunRequest,
            _cancel: CancelSignal,
            emit: &mut dyn FnMut(RunEvent),
        ) -> Result<(), String> {
            for event in (self.events)(req.run_id) {
                emit(event);
            }
            self.result.clone()
        }
    }

    fn runtime_with(provider: ScriptedProvider) -> Arc<SessionRuntime> {
        SessionRuntime::new(
            Arc::new(provider),
            Dispatcher::new(Arc::new(Mutex::new(Workspace::new()))),
            Transcript::new("system"),
        )
    }

    #[test]
    fn empty_prompt_is_rejected() {
        let runtime = runtime_with(ScriptedProvider {
            events: Box::new(|_| Vec::new()),
            result: Ok(()),
        });
        assert!(matches!(runtime.start_run("   "), Err(RuntimeError::EmptyPrompt)));
    }

    #[test]
    fn provider_without_terminal_event_is_failed() {
        let runtime = runtime_with(ScriptedProvider {
            events: Box::new(|run_id| vec![RunEvent::Started { run_id }]),
            result: Ok(()),
        });

        runtime.run_turn("hello").expect("run starts");
        assert_eq!(
            runtime.mode(),
            Mode::Error("Provider exited without terminal event".to_string())
        );
        assert!(!runtime.is_running());
    }

    #[test]
    fn provider_error_result_becomes_failed_event() {
        let runtime = runtime_with(ScriptedProvider {
            events: Box::new(|run_id| {
                vec![
                    RunEvent::Started { run_id },
                    RunEvent::Delta {
                        run_id,
                        text: "<makef path=\"kept.ts\"/>".to_string(),
                    },
                ]
            }),
            result: Err("boom".to_string()),
        });

        runtime.run_turn("hello").expect("run starts");
        assert_eq!(runtime.mode(), Mode::Error("boom".to_string()));

        let workspace = runtime.workspace();
        assert_eq!(workspace.lock().expect("workspace lock").paths(), vec!["kept.ts"]);
    }

    #[test]
    fn second_turn_replays_history_after_first_finishes() {
        let runtime = runtime_with(ScriptedProvider {
            events: Box::new(|run_id| {
                vec![
                    RunEvent::Started { run_id },
                    RunEvent::Delta {
                        run_id,
                        text: format!("reply {run_id}"),
                    },
                    RunEvent::Finished { run_id },
                ]
            }),
            result: Ok(()),
        });

        assert_eq!(runtime.run_turn("first").expect("first run"), 1);
        assert_eq!(runtime.run_turn("second").expect("second run"), 2);

        let transcript = runtime.transcript();
        let texts: Vec<&str> = transcript
            .conversation()
            .iter()
            .map(|message| message.text())
            .collect();
        assert_eq!(texts, vec!["first", "reply 1", "second", "reply 2"]);
        assert_eq!(transcript.last_reply(), Some("reply 2"));
    }

    #[test]
    fn cancel_without_active_run_reports_false() {
        let runtime = runtime_with(ScriptedProvider {
            events: Box::new(|_| Vec::new()),
            result: Ok(()),
        });
        assert!(!runtime.cancel());
        runtime.cancel_run(9);
        assert!(!runtime.is_running());
    }

    #[test]
    fn stale_run_events_are_ignored() {
        let runtime = runtime_with(ScriptedProvider {
            events: Box::new(|run_id| {
                vec![
                    RunEvent::Started { run_id },
                    RunEvent::Delta {
                        run_id: run_id + 100,
                        text: "<makef path=\"ghost\"/>".to_string(),
                    },
                    RunEvent::Finished { run_id },
                ]
            }),
            result: Ok(()),
        });

        runtime.run_turn("hello").expect("run starts");
        assert!(runtime
            .workspace()
            .lock()
            .expect("workspace lock")
            .is_empty());
        assert_eq!(runtime.mode(), Mode::Idle);
    }
}
