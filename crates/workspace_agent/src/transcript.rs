use agent_provider::{RunId, RunMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Running { run_id: RunId },
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub streaming: bool,
    pub run_id: Option<RunId>,
}

/// User-facing messages plus the model-facing conversation replayed on every run.
///
/// While a run streams, its assistant message shows the raw reply. When the run
/// finishes the content is replaced by the display text (tags stripped, or the
/// applied-commands confirmation) and the raw reply joins the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    mode: Mode,
    messages: Vec<Message>,
    conversation: Vec<RunMessage>,
    system_prompt: String,
}

impl Transcript {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            mode: Mode::Idle,
            messages: Vec::new(),
            conversation: Vec::new(),
            system_prompt: system_prompt.into(),
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn conversation(&self) -> &[RunMessage] {
        &self.conversation
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn active_run(&self) -> Option<RunId> {
        match self.mode {
            Mode::Running { run_id } => Some(run_id),
            _ => None,
        }
    }

    /// Last finalized assistant display text.
    pub fn last_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant && !message.streaming)
            .map(|message| message.content.as_str())
    }

    /// Records a submitted prompt and returns the history to send with the run.
    pub fn begin_turn(&mut self, run_id: RunId, prompt: &str) -> Vec<RunMessage> {
        self.messages.push(Message {
            role: Role::User,
            content: prompt.to_string(),
            streaming: false,
            run_id: None,
        });
        self.conversation.push(RunMessage::user(prompt));
        self.mode = Mode::Running { run_id };
        self.conversation.clone()
    }

    /// Undoes [`Transcript::begin_turn`] when the run could not be started.
    pub fn rollback_turn(&mut self, error: &str) {
        if matches!(self.conversation.last(), Some(RunMessage::User { .. })) {
            self.conversation.pop();
        }
        if self
            .messages
            .last()
            .is_some_and(|message| message.role == Role::User)
        {
            self.messages.pop();
        }
        self.mode = Mode::Error(error.to_string());
        self.push_system(format!("Failed to start run: {error}"));
    }

    pub fn push_system(&mut self, content: impl Into<String>) {
        self.messages.push(Message {
            role: Role::System,
            content: content.into(),
            streaming: false,
            run_id: None,
        });
    }

    pub fn on_run_started(&mut self, run_id: RunId) {
        if !self.is_active_run(run_id) || self.assistant_index(run_id).is_some() {
            return;
        }

        self.messages.push(Message {
            role: Role::Assistant,
            content: String::new(),
            streaming: true,
            run_id: Some(run_id),
        });
    }

    pub fn on_run_chunk(&mut self, run_id: RunId, chunk: &str) {
        if !self.is_active_run(run_id) {
            return;
        }

        match self.assistant_index(run_id) {
            Some(index) => self.messages[index].content.push_str(chunk),
            None => self.messages.push(Message {
                role: Role::Assistant,
                content: chunk.to_string(),
                streaming: true,
                run_id: Some(run_id),
            }),
        }
    }

    pub fn on_run_finished(&mut self, run_id: RunId, raw_reply: &str, display_text: String) {
        if !self.is_active_run(run_id) {
            return;
        }

        match self.assistant_index(run_id) {
            Some(index) => {
                let message = &mut self.messages[index];
                message.content = display_text;
                message.streaming = false;
            }
            None => self.messages.push(Message {
                role: Role::Assistant,
                content: display_text,
                streaming: false,
                run_id: Some(run_id),
            }),
        }

        if !raw_reply.is_empty() {
            self.conversation.push(RunMessage::assistant(raw_reply));
        }
        self.mode = Mode::Idle;
    }

    /// Drops the in-flight assistant message and enters the error state.
    pub fn on_run_failed(&mut self, run_id: RunId, error: &str) {
        if !self.is_active_run(run_id) {
            return;
        }

        if let Some(index) = self.assistant_index(run_id) {
            self.messages.remove(index);
        }
        self.mode = Mode::Error(error.to_string());
        self.push_system(format!("Run failed: {error}"));
    }

    /// Keeps the partial reply as streamed, without finalizing it.
    pub fn on_run_cancelled(&mut self, run_id: RunId) {
        if !self.is_active_run(run_id) {
            return;
        }

        if let Some(index) = self.assistant_index(run_id) {
            self.messages[index].streaming = false;
        }
        self.mode = Mode::Idle;
        self.push_system("Run cancelled");
    }

    fn is_active_run(&self, run_id: RunId) -> bool {
        self.active_run() == Some(run_id)
    }

    fn assistant_index(&self, run_id: RunId) -> Option<usize> {
        self.messages
            .iter()
            .rposition(|message| message.role == Role::Assistant && message.run_id == Some(run_id))
    }
}
