//! `RunProvider` adapter over [`AgentApiClient`].

use std::sync::atomic::Ordering;
use std::sync::Arc;

use agent_provider::{
    CancelSignal, ProviderInitError, ProviderProfile, RunEvent, RunProvider, RunRequest,
};
use tracing::{debug, info};

use crate::client::{AgentApiClient, StreamEnd};
use crate::config::AgentApiConfig;
use crate::error::AgentApiError;
use crate::events::AgentStreamEvent;
use crate::payload::ChatRequest;

/// Stable provider identifier used for explicit startup selection.
pub const SSE_PROVIDER_ID: &str = "sse";

trait StreamClient: Send + Sync {
    fn stream(
        &self,
        request: &ChatRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(AgentStreamEvent),
    ) -> Result<StreamEnd, AgentApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: AgentApiClient,
}

impl StreamClient for DefaultStreamClient {
    fn stream(
        &self,
        request: &ChatRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(AgentStreamEvent),
    ) -> Result<StreamEnd, AgentApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                AgentApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
            })?;

        runtime.block_on(
            self.client
                .stream_with_handler(request, Some(cancel), |event| on_event(event)),
        )
    }
}

/// Provider streaming replies from an HTTP/SSE chat endpoint.
pub struct SseAgentProvider {
    endpoint: String,
    conversation_id: Option<String>,
    stream_client: Arc<dyn StreamClient>,
}

impl SseAgentProvider {
    pub fn new(config: AgentApiConfig) -> Result<Self, ProviderInitError> {
        let endpoint = config.endpoint.trim().to_string();
        let conversation_id = config.conversation_id.clone();
        let client = AgentApiClient::new(config).map_err(map_init_error)?;

        Ok(Self {
            endpoint,
            conversation_id,
            stream_client: Arc::new(DefaultStreamClient { client }),
        })
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(stream_client: Arc<dyn StreamClient>) -> Self {
        Self {
            endpoint: "http://test.invalid/api/chat".to_string(),
            conversation_id: Some("conv-test".to_string()),
            stream_client,
        }
    }
}

impl RunProvider for SseAgentProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: SSE_PROVIDER_ID.to_string(),
            model_id: self.endpoint.clone(),
        }
    }

    fn run(
        &self,
        req: RunRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(RunEvent),
    ) -> Result<(), String> {
        let run_id = req.run_id;

        emit(RunEvent::Started { run_id });

        if cancel.load(Ordering::Acquire) {
            emit(RunEvent::Cancelled { run_id });
            return Ok(());
        }

        let request = ChatRequest::from_run(&req, self.conversation_id.as_deref());
        info!(
            run_id,
            endpoint = %self.endpoint,
            messages = request.messages.len(),
            "starting agent stream"
        );

        let outcome = self.stream_client.stream(&request, &cancel, &mut |event| {
            if let AgentStreamEvent::Content { delta } = event {
                if !delta.is_empty() {
                    emit(RunEvent::Delta { run_id, text: delta });
                }
            }
        });

        match outcome {
            Ok(end) => {
                if end == StreamEnd::Eof {
                    debug!(run_id, "agent stream closed without a done chunk");
                }
                emit(RunEvent::Finished { run_id });
            }
            Err(AgentApiError::Cancelled) => emit(RunEvent::Cancelled { run_id }),
            Err(error) => emit(RunEvent::Failed {
                run_id,
                error: format!("Agent request failed: {error}"),
            }),
        }

        Ok(())
    }
}

fn map_init_error(error: AgentApiError) -> ProviderInitError {
    ProviderInitError::new(format!("Failed to initialize sse provider: {error}"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::{Mutex, MutexGuard};

    use agent_provider::RunMessage;
    use pretty_assertions::assert_eq;

    use super::*;

    struct FakeStreamClient {
        events: Vec<AgentStreamEvent>,
        outcome: Mutex<Option<Result<StreamEnd, AgentApiError>>>,
        observed: Mutex<Option<ChatRequest>>,
    }

    impl FakeStreamClient {
        fn new(
            events: Vec<AgentStreamEvent>,
            outcome: Result<StreamEnd, AgentApiError>,
        ) -> Arc<Self> {
            Arc::new(Self {
                events,
                outcome: Mutex::new(Some(outcome)),
                observed: Mutex::new(None),
            })
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    impl StreamClient for FakeStreamClient {
        fn stream(
            &self,
            request: &ChatRequest,
            _cancel: &CancelSignal,
            on_event: &mut dyn FnMut(AgentStreamEvent),
        ) -> Result<StreamEnd, AgentApiError> {
            *lock(&self.observed) = Some(request.clone());
            for event in &self.events {
                on_event(event.clone());
            }
            lock(&self.outcome)
                .take()
                .expect("fake stream outcome should be consumed exactly once")
        }
    }

    fn content(delta: &str) -> AgentStreamEvent {
        AgentStreamEvent::Content {
            delta: delta.to_string(),
        }
    }

    fn run_events(provider: &SseAgentProvider, cancelled: bool) -> Vec<RunEvent> {
        let cancel = Arc::new(AtomicBool::new(cancelled));
        let mut events = Vec::new();

        provider
            .run(
                RunRequest {
                    run_id: 9,
                    messages: vec![RunMessage::user("hello")],
                    instructions: "sys".to_string(),
                },
                cancel,
                &mut |event| events.push(event),
            )
            .expect("run should not return provider-level failure");

        events
    }

    #[test]
    fn content_chunks_become_deltas_and_done_finishes() {
        let stream = FakeStreamClient::new(
            vec![content("<exe>bun "), content(""), content("install</exe>")],
            Ok(StreamEnd::Done),
        );
        let provider = SseAgentProvider::with_stream_client_for_tests(
            Arc::clone(&stream) as Arc<dyn StreamClient>
        );

        assert_eq!(
            run_events(&provider, false),
            vec![
                RunEvent::Started { run_id: 9 },
                RunEvent::Delta {
                    run_id: 9,
                    text: "<exe>bun ".to_string(),
                },
                RunEvent::Delta {
                    run_id: 9,
                    text: "install</exe>".to_string(),
                },
                RunEvent::Finished { run_id: 9 },
            ]
        );

        let observed = lock(&stream.observed).clone().expect("request observed");
        assert_eq!(observed.conversation_id.as_deref(), Some("conv-test"));
        assert_eq!(observed.messages.len(), 2);
        assert_eq!(observed.messages[0].role, "system");
    }

    #[test]
    fn eof_without_done_still_finishes() {
        let stream = FakeStreamClient::new(vec![content("hi")], Ok(StreamEnd::Eof));
        let provider = SseAgentProvider::with_stream_client_for_tests(stream);

        let events = run_events(&provider, false);
        assert_eq!(events.last(), Some(&RunEvent::Finished { run_id: 9 }));
    }

    #[test]
    fn stream_errors_map_to_failed() {
        let stream = FakeStreamClient::new(
            vec![content("partial")],
            Err(AgentApiError::StreamFailed("boom".to_string())),
        );
        let provider = SseAgentProvider::with_stream_client_for_tests(stream);

        let events = run_events(&provider, false);
        assert_eq!(
            events.last(),
            Some(&RunEvent::Failed {
                run_id: 9,
                error: "Agent request failed: stream failed: boom".to_string(),
            })
        );
    }

    #[test]
    fn cancellation_maps_to_cancelled() {
        let stream = FakeStreamClient::new(Vec::new(), Err(AgentApiError::Cancelled));
        let provider = SseAgentProvider::with_stream_client_for_tests(stream);
        assert_eq!(
            run_events(&provider, false).last(),
            Some(&RunEvent::Cancelled { run_id: 9 })
        );
    }

    #[test]
    fn preset_cancel_skips_the_request() {
        let stream = FakeStreamClient::new(Vec::new(), Ok(StreamEnd::Done));
        let provider = SseAgentProvider::with_stream_client_for_tests(
            Arc::clone(&stream) as Arc<dyn StreamClient>
        );

        assert_eq!(
            run_events(&provider, true),
            vec![
                RunEvent::Started { run_id: 9 },
                RunEvent::Cancelled { run_id: 9 },
            ]
        );
        assert!(lock(&stream.observed).is_none());
    }

    #[test]
    fn profile_reports_endpoint() {
        let provider = SseAgentProvider::with_stream_client_for_tests(FakeStreamClient::new(
            Vec::new(),
            Ok(StreamEnd::Done),
        ));
        let profile = provider.profile();
        assert_eq!(profile.provider_id, SSE_PROVIDER_ID);
        assert_eq!(profile.model_id, "http://test.invalid/api/chat");
    }

    #[test]
    fn new_rejects_invalid_endpoint() {
        let error = SseAgentProvider::new(AgentApiConfig::new("nope"))
            .err()
            .expect("invalid endpoint should fail");
        assert!(error.message().starts_with("Failed to initialize sse provider"));
    }
}
