use agent_provider_sse::{AgentStreamEvent, SseStreamParser};
use pretty_assertions::assert_eq;

#[test]
fn maps_content_done_and_error_chunks() {
    let events = SseStreamParser::parse_frames(concat!(
        "data: {\"type\":\"content\",\"delta\":\"Done! \"}\n\n",
        "data: {\"type\":\"content\",\"delta\":\"<exe>bun install</exe>\"}\n\n",
        "data: {\"type\":\"error\",\"error\":{\"message\":\"quota\"}}\n\n",
        "data: {\"type\":\"done\"}\n\n",
    ));

    assert_eq!(
        events,
        vec![
            AgentStreamEvent::Content {
                delta: "Done! ".to_string(),
            },
            AgentStreamEvent::Content {
                delta: "<exe>bun install</exe>".to_string(),
            },
            AgentStreamEvent::Error {
                message: "quota".to_string(),
            },
            AgentStreamEvent::Done,
        ]
    );
}

#[test]
fn unknown_types_malformed_json_and_comments_are_skipped() {
    let events = SseStreamParser::parse_frames(concat!(
        ": keep-alive\n\n",
        "data: {\"type\":\"tool_call\",\"name\":\"x\"}\n\n",
        "data: {not json\n\n",
        "event: message\ndata: {\"type\":\"content\",\"delta\":\"ok\"}\n\n",
        "data: [DONE]\n\n",
    ));

    assert_eq!(
        events,
        vec![AgentStreamEvent::Content {
            delta: "ok".to_string(),
        }]
    );
}

#[test]
fn crlf_framing_is_accepted() {
    let events =
        SseStreamParser::parse_frames("data: {\"type\":\"content\",\"delta\":\"a\"}\r\n\r\n");
    assert_eq!(
        events,
        vec![AgentStreamEvent::Content {
            delta: "a".to_string(),
        }]
    );
}

#[test]
fn byte_at_a_time_feeding_matches_one_shot() {
    let input = concat!(
        "data: {\"type\":\"content\",\"delta\":\"héllo \"}\n\n",
        "data: {\"type\":\"content\",\"delta\":\"wörld\"}\n\n",
        "data: {\"type\":\"done\"}\n\n",
    );

    let mut parser = SseStreamParser::default();
    let mut events = Vec::new();
    for byte in input.as_bytes() {
        events.extend(parser.feed(std::slice::from_ref(byte)));
    }

    assert_eq!(events, SseStreamParser::parse_frames(input));
    assert!(parser.is_empty_buffer());
}

#[test]
fn trailing_partial_frame_stays_buffered() {
    let mut parser = SseStreamParser::default();
    assert!(parser
        .feed(b"data: {\"type\":\"content\",\"delta\":\"x\"}\n")
        .is_empty());
    assert!(!parser.is_empty_buffer());
}
