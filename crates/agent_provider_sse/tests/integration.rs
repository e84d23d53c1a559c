use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use agent_provider_sse::{
    AgentApiClient, AgentApiConfig, AgentApiError, AgentStreamEvent, ChatMessage, ChatRequest,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

#[derive(Clone)]
struct ResponseChunk {
    delay_ms: u64,
    bytes: Vec<u8>,
}

#[derive(Clone)]
enum ScriptedResponse {
    Respond {
        status: u16,
        content_type: &'static str,
        chunks: Vec<ResponseChunk>,
    },
    Reset,
}

struct ScriptedServer {
    endpoint: String,
    request_count: Arc<AtomicUsize>,
    last_request: Arc<Mutex<Option<String>>>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let request_count = Arc::new(AtomicUsize::new(0));
        let last_request = Arc::new(Mutex::new(None));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let endpoint = format!("http://{addr}/api/chat");

        let handle = tokio::spawn({
            let scripts = Arc::clone(&scripts);
            let request_count = Arc::clone(&request_count);
            let last_request = Arc::clone(&last_request);

            async move {
                loop {
                    let (socket, _) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    let scripts = Arc::clone(&scripts);
                    let request_count = Arc::clone(&request_count);
                    let last_request = Arc::clone(&last_request);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, request_count, last_request).await;
                    });
                }
            }
        });

        Self {
            endpoint,
            request_count,
            last_request,
            handle,
        }
    }

    fn client(&self) -> AgentApiClient {
        let config = AgentApiConfig::new(&self.endpoint)
            .with_conversation_id("conv-1")
            .with_retry_base_delay(Duration::from_millis(10));
        AgentApiClient::new(config).expect("client")
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Acquire)
    }

    fn last_request(&self) -> String {
        self.last_request
            .lock()
            .expect("request log lock")
            .clone()
            .unwrap_or_default()
    }

    fn shutdown(&self) {
        self.handle.abort();
    }
}

fn request() -> ChatRequest {
    ChatRequest {
        messages: vec![ChatMessage::new("user", "make a page")],
        conversation_id: Some("conv-1".to_string()),
    }
}

fn response_sse(status: u16, frames: &[&str]) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        content_type: "text/event-stream",
        chunks: frames
            .iter()
            .map(|frame| ResponseChunk {
                delay_ms: 0,
                bytes: format!("data: {frame}\n\n").into_bytes(),
            })
            .collect(),
    }
}

fn response_json(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        content_type: "application/json",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: body.as_bytes().to_vec(),
        }],
    }
}

#[tokio::test]
async fn streams_content_until_done() {
    let server = ScriptedServer::new(vec![response_sse(
        200,
        &[
            r#"{"type":"content","delta":"Done! "}"#,
            r#"{"type":"content","delta":"<exe>bun install</exe>"}"#,
            r#"{"type":"done"}"#,
        ],
    )])
    .await;

    let events = server
        .client()
        .stream(&request(), None)
        .await
        .expect("stream should succeed");

    assert_eq!(
        events,
        vec![
            AgentStreamEvent::Content {
                delta: "Done! ".to_string(),
            },
            AgentStreamEvent::Content {
                delta: "<exe>bun install</exe>".to_string(),
            },
            AgentStreamEvent::Done,
        ]
    );

    let raw = server.last_request();
    assert!(raw.starts_with("POST /api/chat"), "{raw}");
    assert!(raw.contains("\"conversationId\":\"conv-1\""), "{raw}");
    assert!(raw.to_ascii_lowercase().contains("accept: text/event-stream"), "{raw}");

    server.shutdown();
}

#[tokio::test]
async fn error_chunk_fails_the_stream() {
    let server = ScriptedServer::new(vec![response_sse(
        200,
        &[
            r#"{"type":"content","delta":"partial"}"#,
            r#"{"type":"error","error":{"message":"model crashed"}}"#,
        ],
    )])
    .await;

    let mut seen = Vec::new();
    let result = server
        .client()
        .stream_with_handler(&request(), None, |event| seen.push(event))
        .await;

    assert!(matches!(
        result,
        Err(AgentApiError::StreamFailed(message)) if message == "model crashed"
    ));
    assert_eq!(seen.len(), 1);

    server.shutdown();
}

#[tokio::test]
async fn retryable_status_then_success() {
    let server = ScriptedServer::new(vec![
        response_json(503, r#"{"error":{"message":"overloaded"}}"#),
        response_sse(200, &[r#"{"type":"done"}"#]),
    ])
    .await;

    let events = timeout(Duration::from_secs(5), server.client().stream(&request(), None))
        .await
        .expect("retry path should be bounded")
        .expect("stream should eventually succeed");

    assert_eq!(events, vec![AgentStreamEvent::Done]);
    assert_eq!(server.request_count(), 2);

    server.shutdown();
}

#[tokio::test]
async fn non_retryable_status_fails_explicitly() {
    let server =
        ScriptedServer::new(vec![response_json(400, r#"{"error":"Invalid messages"}"#)]).await;

    let error = server
        .client()
        .stream(&request(), None)
        .await
        .expect_err("bad request should fail");

    assert!(matches!(
        error,
        AgentApiError::Status(status, ref message) if status.as_u16() == 400 && message == "Invalid messages"
    ));
    assert_eq!(server.request_count(), 1);

    server.shutdown();
}

#[tokio::test]
async fn connection_resets_exhaust_retries() {
    let server = ScriptedServer::new(vec![ScriptedResponse::Reset; 4]).await;

    let error = timeout(Duration::from_secs(10), server.client().stream(&request(), None))
        .await
        .expect("retry path should resolve")
        .expect_err("connection reset should surface as failure");

    assert!(matches!(
        error,
        AgentApiError::RetryExhausted { status: None, .. }
    ));
    assert_eq!(server.request_count(), 4);

    server.shutdown();
}

#[tokio::test]
async fn cancellation_interrupts_a_slow_stream() {
    let server = ScriptedServer::new(vec![ScriptedResponse::Respond {
        status: 200,
        content_type: "text/event-stream",
        chunks: vec![
            ResponseChunk {
                delay_ms: 0,
                bytes: b"data: {\"type\":\"content\",\"delta\":\"a\"}\n\n".to_vec(),
            },
            ResponseChunk {
                delay_ms: 5_000,
                bytes: b"data: {\"type\":\"done\"}\n\n".to_vec(),
            },
        ],
    }])
    .await;

    let cancel = Arc::new(AtomicBool::new(false));
    let client = server.client();
    let trigger = Arc::clone(&cancel);
    let result = timeout(
        Duration::from_secs(3),
        client.stream_with_handler(&request(), Some(&cancel), move |_| {
            trigger.store(true, Ordering::Release);
        }),
    )
    .await
    .expect("cancellation should end the stream promptly");

    assert!(matches!(result, Err(AgentApiError::Cancelled)));

    server.shutdown();
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        429 => "Too Many Requests",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    request_count: Arc<AtomicUsize>,
    last_request: Arc<Mutex<Option<String>>>,
) {
    let Ok(raw) = read_request(&mut socket).await else {
        return;
    };
    if let Ok(mut slot) = last_request.lock() {
        *slot = Some(raw);
    }

    let index = request_count.fetch_add(1, Ordering::AcqRel);
    let response = scripts
        .get(index)
        .cloned()
        .unwrap_or_else(|| response_json(500, r#"{"error":"unexpected request"}"#));

    match response {
        ScriptedResponse::Reset => {}
        ScriptedResponse::Respond {
            status,
            content_type,
            chunks,
        } => {
            let headers = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
                status_reason(status),
                content_type,
            );

            if socket.write_all(headers.as_bytes()).await.is_err() {
                return;
            }

            for chunk in chunks {
                if chunk.delay_ms > 0 {
                    sleep(Duration::from_millis(chunk.delay_ms)).await;
                }
                let prefix = format!("{:X}\r\n", chunk.bytes.len());
                if socket.write_all(prefix.as_bytes()).await.is_err() {
                    return;
                }
                if socket.write_all(&chunk.bytes).await.is_err() {
                    return;
                }
                if socket.write_all(b"\r\n").await.is_err() {
                    return;
                }
            }

            let _ = socket.write_all(b"0\r\n\r\n").await;
            let _ = socket.shutdown().await;
        }
    }
}

/// Reads headers plus a `Content-Length` body so the client never sees a reset
/// while still writing.
async fn read_request(socket: &mut TcpStream) -> std::io::Result<String> {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 2048];

    loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buffer[..n]);

        let Some(header_end) = request.windows(4).position(|window| window == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if request.len() >= header_end + 4 + content_length {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&request).into_owned())
}
