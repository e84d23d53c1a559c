use serde_json::Value;
use tracing::debug;

use crate::events::AgentStreamEvent;

/// Incremental parser for SSE text streams.
///
/// Frames are separated by a blank line; only `data:` lines matter. Bytes are
/// buffered until a frame is complete, so UTF-8 sequences split across network
/// chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: Vec<u8>,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<AgentStreamEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some((split, separator_len)) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..split + separator_len).collect();
            let frame = String::from_utf8_lossy(&frame[..split]);

            let Some(payload) = extract_data_payload(&frame) else {
                continue;
            };
            if payload == "[DONE]" {
                continue;
            }

            match serde_json::from_str::<Value>(&payload) {
                Ok(value) => events.extend(map_event(value)),
                Err(error) => debug!(%error, "skipping malformed SSE payload"),
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<AgentStreamEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

/// Byte offset of the first blank-line separator and its length. Accepts both
/// `\n\n` and `\r\n\r\n`.
fn find_frame_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|window| window == b"\n\n");
    let crlf = buffer.windows(4).position(|window| window == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(lf), Some(crlf)) if crlf < lf => Some((crlf, 4)),
        (Some(lf), _) => Some((lf, 2)),
        (None, Some(crlf)) => Some((crlf, 4)),
        (None, None) => None,
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn map_event(value: Value) -> Option<AgentStreamEvent> {
    let event_type = value.get("type")?.as_str()?;

    match event_type {
        "content" => {
            let delta = value
                .get("delta")
                .and_then(|value| value.as_str())
                .unwrap_or("");
            Some(AgentStreamEvent::Content {
                delta: delta.to_owned(),
            })
        }
        "done" => Some(AgentStreamEvent::Done),
        "error" => {
            let message = value
                .get("error")
                .and_then(|error| error.get("message").or(Some(error)))
                .and_then(|value| value.as_str())
                .unwrap_or("agent stream error")
                .to_owned();
            Some(AgentStreamEvent::Error { message })
        }
        other => {
            debug!(event_type = other, "ignoring unknown SSE chunk type");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SseStreamParser;
    use crate::events::AgentStreamEvent;

    #[test]
    fn parse_sse_frames_incrementally() {
        let mut parser = SseStreamParser::default();
        let mut events = Vec::new();

        events.extend(parser.feed(b"data: {\"type\":\"content\",\"delta\":\"Hel"));
        assert!(events.is_empty());
        events.extend(parser.feed(b"lo\"}\n\n"));
        assert_eq!(
            events,
            vec![AgentStreamEvent::Content {
                delta: "Hello".to_string(),
            }]
        );

        events.extend(parser.feed(b"data: [DONE]\n\n"));
        assert_eq!(events.len(), 1);
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn multibyte_characters_split_across_feeds_decode_once_complete() {
        let frame = "data: {\"type\":\"content\",\"delta\":\"✓\"}\n\n".as_bytes();
        let split = frame
            .iter()
            .position(|byte| *byte == 0xE2)
            .expect("check mark lead byte")
            + 1;

        let mut parser = SseStreamParser::default();
        assert!(parser.feed(&frame[..split]).is_empty());
        assert_eq!(
            parser.feed(&frame[split..]),
            vec![AgentStreamEvent::Content {
                delta: "✓".to_string(),
            }]
        );
    }
}
