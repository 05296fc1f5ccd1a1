//! Browser engine and executor bound to an out-of-process automation
//! sidecar over HTTP.
//!
//! [`SidecarLauncher`] starts the sidecar's browser and returns a
//! [`SidecarBrowser`]; contexts map to sidecar context ids, and
//! [`SidecarExecutor`] forwards invocations to `POST /agent/run`.

pub mod api;

use std::sync::Arc;

use async_trait::async_trait;
use webpilot_core::job::ContextConfig;

use crate::config::BrowserConfig;
use crate::engine::{BrowserContext, BrowserLauncher, SharedBrowser};
use crate::error::BrowserError;
use crate::executor::{AutomationExecutor, ExecutorError, ExecutorOutput, Invocation};

pub use api::{SidecarApi, SidecarApiError};

use api::{AgentRunRequest, AgentRunResponse, LaunchRequest};

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SidecarLauncher {
    api: SidecarApi,
}

impl SidecarLauncher {
    pub fn new(api: SidecarApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl BrowserLauncher for SidecarLauncher {
    async fn launch(&self, config: &BrowserConfig) -> Result<Arc<dyn SharedBrowser>, BrowserError> {
        self.api.health().await.map_err(|e| {
            BrowserError::Launch(format!("sidecar at {} unreachable: {e}", self.api.base_url()))
        })?;

        let request = LaunchRequest {
            headless: config.headless,
            disable_security: config.disable_security,
            browser_binary_path: config.binary_path.as_deref(),
        };
        self.api
            .launch_browser(&request)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        Ok(Arc::new(SidecarBrowser {
            api: self.api.clone(),
        }))
    }
}

pub struct SidecarBrowser {
    api: SidecarApi,
}

#[async_trait]
impl SharedBrowser for SidecarBrowser {
    async fn new_context(
        &self,
        config: &ContextConfig,
    ) -> Result<Arc<dyn BrowserContext>, BrowserError> {
        let created = self
            .api
            .create_context(config)
            .await
            .map_err(|e| BrowserError::ContextCreation(e.to_string()))?;

        Ok(Arc::new(SidecarContext {
            api: self.api.clone(),
            id: created.context_id,
        }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.api.close_browser().await.map_err(|e| BrowserError::Close {
            target: "browser".to_string(),
            reason: e.to_string(),
        })
    }
}

pub struct SidecarContext {
    api: SidecarApi,
    id: String,
}

#[async_trait]
impl BrowserContext for SidecarContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.api
            .close_context(&self.id)
            .await
            .map_err(|e| BrowserError::Close {
                target: format!("context {}", self.id),
                reason: e.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct SidecarExecutor {
    api: SidecarApi,
}

impl SidecarExecutor {
    pub fn new(api: SidecarApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl AutomationExecutor for SidecarExecutor {
    async fn run(&self, invocation: Invocation<'_>) -> Result<ExecutorOutput, ExecutorError> {
        let request = AgentRunRequest {
            job_id: invocation.job_id,
            task: invocation.task,
            llm: invocation.backend,
            sensitive_data: invocation.sensitive_data,
            initial_actions: invocation.initial_actions,
            context_id: invocation.context.context_id(),
            return_screenshots: invocation.return_screenshots,
        };

        tokio::select! {
            result = self.api.run_agent(&request) => match result {
                Ok(response) => into_output(response),
                Err(SidecarApiError::ApiError { status, body }) => {
                    Err(classify_error_body(status, &body))
                }
                Err(e) => Err(ExecutorError::Failed(e.to_string())),
            },
            _ = invocation.cancel.cancelled() => {
                if let Err(e) = self.api.cancel_agent(invocation.job_id).await {
                    tracing::warn!(
                        job_id = %invocation.job_id,
                        error = %e,
                        "Sidecar did not acknowledge cancellation",
                    );
                }
                Err(ExecutorError::Cancelled)
            }
        }
    }
}

fn into_output(response: AgentRunResponse) -> Result<ExecutorOutput, ExecutorError> {
    if let Some(message) = response.error {
        return Err(classify(response.error_kind.as_deref(), message));
    }
    Ok(ExecutorOutput {
        final_result: response.final_result,
        screenshots: response.screenshots,
    })
}

/// A non-2xx response may still carry a structured `{error, error_kind}` body.
fn classify_error_body(status: u16, body: &str) -> ExecutorError {
    match serde_json::from_str::<AgentRunResponse>(body) {
        Ok(AgentRunResponse {
            error: Some(message),
            error_kind,
            ..
        }) => classify(error_kind.as_deref(), message),
        _ => ExecutorError::Failed(format!("sidecar returned HTTP {status}: {body}")),
    }
}

fn classify(kind: Option<&str>, message: String) -> ExecutorError {
    match kind {
        Some("configuration") => ExecutorError::Configuration(message),
        Some("navigation") => ExecutorError::Navigation(message),
        Some("timeout") => ExecutorError::Timeout(message),
        _ => ExecutorError::Failed(message),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
