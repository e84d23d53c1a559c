use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::config::AgentApiConfig;
use crate::error::{parse_error_message, AgentApiError};
use crate::events::AgentStreamEvent;
use crate::payload::ChatRequest;
use crate::retry::{is_retryable_http_error, retry_delay, MAX_RETRIES};
use crate::sse::SseStreamParser;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How a stream ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// A `done` chunk arrived.
    Done,
    /// The body ended without a `done` chunk.
    Eof,
}

#[derive(Debug)]
pub struct AgentApiClient {
    http: Client,
    config: AgentApiConfig,
    endpoint: Url,
}

impl AgentApiClient {
    pub fn new(config: AgentApiConfig) -> Result<Self, AgentApiError> {
        let endpoint = config.endpoint_url()?;
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(AgentApiError::from)?;
        Ok(Self {
            http,
            config,
            endpoint,
        })
    }

    pub fn config(&self) -> &AgentApiConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn build_request(&self, request: &ChatRequest) -> reqwest::RequestBuilder {
        self.http
            .post(self.endpoint.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(request)
    }

    pub async fn send_with_retry(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, AgentApiError> {
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if is_cancelled(cancellation) {
                return Err(AgentApiError::Cancelled);
            }

            let response = self.build_request(request).send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(AgentApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    let status = response.status();
                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_default();
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < MAX_RETRIES && is_retryable_http_error(status.as_u16(), &body) {
                        warn!(%status, attempt, error = %message, "retrying agent request");
                        self.backoff(attempt, cancellation).await?;
                        continue;
                    }

                    return Err(AgentApiError::Status(status, message));
                }
                Err(error) => {
                    let message = error.to_string();
                    last_error = Some(message.clone());
                    if attempt < MAX_RETRIES {
                        warn!(
                            attempt,
                            error = %message,
                            "retrying agent request after transport error"
                        );
                        self.backoff(attempt, cancellation).await?;
                        continue;
                    }
                    return Err(AgentApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(AgentApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    async fn backoff(
        &self,
        attempt: u32,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<(), AgentApiError> {
        let delay = retry_delay(self.config.retry_base_delay, attempt);
        await_or_cancel(tokio::time::sleep(delay), cancellation).await
    }

    /// Streams one reply, handing each content/done chunk to `on_event` as it is
    /// parsed. An `error` chunk ends the stream with [`AgentApiError::StreamFailed`].
    pub async fn stream_with_handler<F>(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<StreamEnd, AgentApiError>
    where
        F: FnMut(AgentStreamEvent),
    {
        let response = self.send_with_retry(request, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            let chunk = chunk.map_err(AgentApiError::from)?;
            for event in parser.feed(&chunk) {
                match event {
                    AgentStreamEvent::Error { message } => {
                        return Err(AgentApiError::StreamFailed(message));
                    }
                    AgentStreamEvent::Done => {
                        on_event(AgentStreamEvent::Done);
                        return Ok(StreamEnd::Done);
                    }
                    event => on_event(event),
                }
            }
        }

        if is_cancelled(cancellation) {
            return Err(AgentApiError::Cancelled);
        }
        if !parser.is_empty_buffer() {
            debug!("agent stream ended with an incomplete trailing frame");
        }

        Ok(StreamEnd::Eof)
    }

    /// Streams one reply and collects every chunk.
    pub async fn stream(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Vec<AgentStreamEvent>, AgentApiError> {
        let mut events = Vec::new();
        self.stream_with_handler(request, cancellation, |event| events.push(event))
            .await?;
        Ok(events)
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, AgentApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(AgentApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(AgentApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AgentApiClient;
    use crate::config::AgentApiConfig;
    use crate::payload::{ChatMessage, ChatRequest};

    #[test]
    fn build_request_posts_json_and_accepts_event_stream() {
        let client = AgentApiClient::new(AgentApiConfig::new("http://127.0.0.1:9/api/chat"))
            .expect("client builds");
        let request = client
            .build_request(&ChatRequest {
                messages: vec![ChatMessage::new("user", "hi")],
                conversation_id: None,
            })
            .build()
            .expect("request builds");

        assert_eq!(request.method(), "POST");
        assert_eq!(request.url().as_str(), "http://127.0.0.1:9/api/chat");
        assert_eq!(
            request
                .headers()
                .get(reqwest::header::ACCEPT)
                .and_then(|value| value.to_str().ok()),
            Some("text/event-stream")
        );
    }

    #[test]
    fn invalid_endpoint_fails_construction() {
        assert!(AgentApiClient::new(AgentApiConfig::new("")).is_err());
    }
}
