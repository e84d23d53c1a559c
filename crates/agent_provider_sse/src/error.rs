use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum AgentApiError {
    MissingEndpoint,
    InvalidEndpoint(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    /// The endpoint sent an `error` chunk mid-stream.
    StreamFailed(String),
    Cancelled,
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<ErrorPayloadValue>,
}

/// Chat endpoints answer errors either as `{"error":"text"}` or
/// `{"error":{"message":"text"}}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorPayloadValue {
    Text(String),
    Object { message: Option<String> },
}

impl fmt::Display for AgentApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEndpoint => write!(f, "agent endpoint is required"),
            Self::InvalidEndpoint(value) => write!(f, "invalid agent endpoint: {value}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(
                    f,
                    "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})"
                )
            }
            Self::StreamFailed(message) => write!(f, "stream failed: {message}"),
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for AgentApiError {}

impl From<reqwest::Error> for AgentApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for AgentApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Extracts a human-readable message from an error response body.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .and_then(|payload| payload.error)
        .and_then(|value| match value {
            ErrorPayloadValue::Text(text) => Some(text),
            ErrorPayloadValue::Object { message } => message,
        })
        .filter(|message| !message.trim().is_empty());

    if let Some(message) = message {
        return message;
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}
