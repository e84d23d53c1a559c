use tracing::trace;

use crate::protocol::command::Command;
use crate::protocol::grammar::scan;

/// Incremental extractor for command tags in a chunk-delivered reply.
///
/// Owns the text received so far that has not been resolved into commands. Use one
/// extractor per streamed message; never share one buffer across streams.
#[derive(Debug, Default)]
pub struct CommandExtractor {
    buffer: String,
}

impl CommandExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and drains every command whose tag is now complete.
    ///
    /// The buffer keeps only the text after the last emitted command, so a tag is
    /// never emitted twice. An opener whose closing tag has not arrived yet stays
    /// buffered, along with everything after it.
    pub fn parse(&mut self, chunk: &str) -> Vec<Command> {
        self.buffer.push_str(chunk);
        self.drain(false)
    }

    /// Resolves what is left once the stream has ended.
    ///
    /// Openers that never closed are treated as literal text, so complete tags that
    /// were queued behind them are emitted now. The buffer is empty afterwards.
    pub fn finish(&mut self) -> Vec<Command> {
        let commands = self.drain(true);
        self.buffer.clear();
        commands
    }

    /// Text received but not yet resolved into commands.
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }

    /// Discards buffered text, e.g. when the upstream message was replaced.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    fn drain(&mut self, at_eof: bool) -> Vec<Command> {
        let found = scan(&self.buffer, at_eof);
        let Some(consumed) = found.last().map(|last| last.end) else {
            return Vec::new();
        };

        let commands: Vec<Command> = found.iter().map(Command::from_match).collect();
        self.buffer.drain(..consumed);
        trace!(
            emitted = commands.len(),
            retained = self.buffer.len(),
            "extracted agent commands"
        );
        commands
    }
}

/// Extracts every command from a complete reply in one shot.
#[must_use]
pub fn extract_all(text: &str) -> Vec<Command> {
    let mut extractor = CommandExtractor::new();
    let mut commands = extractor.parse(text);
    commands.extend(extractor.finish());
    commands
}
