use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::error::ExecError;
use crate::request::{ExecRequest, ExecResponse};
use crate::{CommandExecutor, DEFAULT_TIMEOUT_MS, DEFAULT_WORKDIR};

/// Extra time granted to the HTTP round trip on top of the command timeout.
const HTTP_GRACE: Duration = Duration::from_secs(5);

/// Forwards requests to a remote `/api/exec` endpoint.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    http: Client,
    endpoint: Url,
    default_workdir: String,
    default_timeout_ms: u64,
}

impl HttpExecutor {
    pub fn new(endpoint: Url) -> Result<Self, ExecError> {
        Self::with_defaults(endpoint, DEFAULT_WORKDIR, DEFAULT_TIMEOUT_MS)
    }

    pub fn with_defaults(
        endpoint: Url,
        default_workdir: impl Into<String>,
        default_timeout_ms: u64,
    ) -> Result<Self, ExecError> {
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            endpoint,
            default_workdir: default_workdir.into(),
            default_timeout_ms,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, request: &ExecRequest) -> Result<ExecResponse, ExecError> {
        let timeout_ms = request.timeout_ms.unwrap_or(self.default_timeout_ms);
        let response = self
            .http
            .post(self.endpoint.clone())
            .timeout(Duration::from_millis(timeout_ms).saturating_add(HTTP_GRACE))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExecError::HttpStatus {
                status: status.as_u16(),
            });
        }

        Ok(response.json::<ExecResponse>().await?)
    }

    fn post_blocking(&self, request: &ExecRequest) -> Result<ExecResponse, ExecError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| ExecError::Runtime { source })?;
        runtime.block_on(self.post(request))
    }
}

impl CommandExecutor for HttpExecutor {
    fn execute(&self, request: &ExecRequest) -> ExecResponse {
        let request = request.resolved(&self.default_workdir, self.default_timeout_ms);
        debug!(command = %request.command, endpoint = %self.endpoint, "forwarding command");

        match self.post_blocking(&request) {
            Ok(response) => response,
            Err(error) => {
                warn!(command = %request.command, %error, "exec request failed");
                ExecResponse::transport_failure(&request.command, &error)
            }
        }
    }
}
