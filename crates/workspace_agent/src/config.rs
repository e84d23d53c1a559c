//! Environment configuration.

use std::env;
use std::path::PathBuf;

use command_exec::{DEFAULT_TIMEOUT_MS, DEFAULT_WORKDIR};
use thiserror::Error;
use url::Url;

use crate::prompt::sanitize_system_prompt;

pub const PROVIDER_ENV_VAR: &str = "AGENT_WORKSPACE_PROVIDER";
pub const ENDPOINT_ENV_VAR: &str = "AGENT_WORKSPACE_ENDPOINT";
pub const EXECUTOR_ENV_VAR: &str = "AGENT_WORKSPACE_EXECUTOR";
pub const EXEC_URL_ENV_VAR: &str = "AGENT_WORKSPACE_EXEC_URL";
pub const WORKDIR_ENV_VAR: &str = "AGENT_WORKSPACE_WORKDIR";
pub const EXEC_TIMEOUT_ENV_VAR: &str = "AGENT_WORKSPACE_EXEC_TIMEOUT_MS";
pub const STORE_DIR_ENV_VAR: &str = "AGENT_WORKSPACE_STORE_DIR";
pub const LOG_ENV_VAR: &str = "AGENT_WORKSPACE_LOG";
pub const SYSTEM_PROMPT_ENV_VAR: &str = "AGENT_WORKSPACE_SYSTEM_PROMPT";

pub const DEFAULT_PROVIDER_ID: &str = "mock";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be one of local, http, off (got '{value}')")]
    UnknownExecutor { var: &'static str, value: String },
    #[error("{var} must be a positive integer number of milliseconds (got '{value}')")]
    InvalidTimeout { var: &'static str, value: String },
    #[error("{var} is required when {requirement}")]
    Missing {
        var: &'static str,
        requirement: &'static str,
    },
    #[error("{var} is not a valid http(s) URL: '{value}'")]
    InvalidUrl { var: &'static str, value: String },
}

/// Where `<exe>` commands go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorKind {
    Local,
    Http { endpoint: Url },
    Off,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub provider_id: String,
    pub endpoint: Option<String>,
    pub executor: ExecutorKind,
    pub workdir: String,
    pub exec_timeout_ms: u64,
    pub store_dir: Option<PathBuf>,
    pub log_filter: String,
    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider_id: DEFAULT_PROVIDER_ID.to_string(),
            endpoint: None,
            executor: ExecutorKind::Local,
            workdir: DEFAULT_WORKDIR.to_string(),
            exec_timeout_ms: DEFAULT_TIMEOUT_MS,
            store_dir: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            system_prompt: sanitize_system_prompt(None),
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider_id = env_string_opt(PROVIDER_ENV_VAR)
            .map(|value| value.trim().to_string())
            .unwrap_or_else(|| DEFAULT_PROVIDER_ID.to_string());

        let endpoint = env_string_opt(ENDPOINT_ENV_VAR).map(|value| value.trim().to_string());

        let executor = match env_string_opt(EXECUTOR_ENV_VAR)
            .map(|value| value.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("local") => ExecutorKind::Local,
            Some("off") => ExecutorKind::Off,
            Some("http") => {
                let raw = env_string_opt(EXEC_URL_ENV_VAR).ok_or(ConfigError::Missing {
                    var: EXEC_URL_ENV_VAR,
                    requirement: "AGENT_WORKSPACE_EXECUTOR=http",
                })?;
                ExecutorKind::Http {
                    endpoint: parse_http_url(EXEC_URL_ENV_VAR, &raw)?,
                }
            }
            Some(other) => {
                return Err(ConfigError::UnknownExecutor {
                    var: EXECUTOR_ENV_VAR,
                    value: other.to_string(),
                })
            }
        };

        let workdir = env_string_opt(WORKDIR_ENV_VAR)
            .map(|value| value.trim().to_string())
            .unwrap_or_else(|| DEFAULT_WORKDIR.to_string());

        let exec_timeout_ms = match env_string_opt(EXEC_TIMEOUT_ENV_VAR) {
            None => DEFAULT_TIMEOUT_MS,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(value) if value > 0 => value,
                _ => {
                    return Err(ConfigError::InvalidTimeout {
                        var: EXEC_TIMEOUT_ENV_VAR,
                        value: raw,
                    })
                }
            },
        };

        Ok(Self {
            provider_id,
            endpoint,
            executor,
            workdir,
            exec_timeout_ms,
            store_dir: env_string_opt(STORE_DIR_ENV_VAR).map(PathBuf::from),
            log_filter: env_string_opt(LOG_ENV_VAR)
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            system_prompt: sanitize_system_prompt(
                env_string_opt(SYSTEM_PROMPT_ENV_VAR).as_deref(),
            ),
        })
    }
}

fn parse_http_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        var,
        value: raw.to_string(),
    };
    let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
    if matches!(url.scheme(), "http" | "https") {
        Ok(url)
    } else {
        Err(invalid())
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
