use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_provider::{ProviderInitError, RunProvider};
use agent_provider_mock::{MockProvider, MOCK_PROVIDER_ID};
use agent_provider_sse::{AgentApiConfig, SseAgentProvider, SSE_PROVIDER_ID};
use command_exec::{CommandExecutor, HttpExecutor, LocalExecutor, DEFAULT_WORKDIR};
use tracing::info;

use crate::config::{AgentConfig, ExecutorKind, ENDPOINT_ENV_VAR};

/// Resolves the configured provider. `conversation_id` is forwarded to transports that
/// keep server-side conversation state.
pub fn provider_for_config(
    config: &AgentConfig,
    conversation_id: Option<&str>,
) -> Result<Arc<dyn RunProvider>, ProviderInitError> {
    match config.provider_id.as_str() {
        MOCK_PROVIDER_ID => Ok(Arc::new(MockProvider::default())),
        SSE_PROVIDER_ID => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                ProviderInitError::new(format!(
                    "Provider '{SSE_PROVIDER_ID}' requires {ENDPOINT_ENV_VAR}"
                ))
            })?;
            let mut api_config = AgentApiConfig::new(endpoint);
            if let Some(conversation_id) = conversation_id {
                api_config = api_config.with_conversation_id(conversation_id);
            }
            Ok(Arc::new(SseAgentProvider::new(api_config)?))
        }
        unknown => Err(ProviderInitError::new(format!(
            "Unsupported provider '{unknown}'. Available providers: {MOCK_PROVIDER_ID}, {SSE_PROVIDER_ID}"
        ))),
    }
}

/// `None` when execution is switched off.
pub fn executor_for_config(
    config: &AgentConfig,
) -> Result<Option<Arc<dyn CommandExecutor>>, command_exec::ExecError> {
    match &config.executor {
        ExecutorKind::Local => Ok(Some(Arc::new(LocalExecutor::new(
            local_workdir(&config.workdir),
            config.exec_timeout_ms,
        )))),
        ExecutorKind::Http { endpoint } => Ok(Some(Arc::new(HttpExecutor::with_defaults(
            endpoint.clone(),
            &config.workdir,
            config.exec_timeout_ms,
        )?))),
        ExecutorKind::Off => Ok(None),
    }
}

/// Working directory for the local executor. The built-in `/myapp` default falls back
/// to the current directory on hosts that do not have it.
fn local_workdir(configured: &str) -> PathBuf {
    if configured != DEFAULT_WORKDIR || Path::new(configured).is_dir() {
        return PathBuf::from(configured);
    }

    match std::env::current_dir() {
        Ok(current) => {
            info!(
                missing = configured,
                workdir = %current.display(),
                "default workdir missing; running commands in the current directory"
            );
            current
        }
        Err(_) => PathBuf::from(configured),
    }
}
