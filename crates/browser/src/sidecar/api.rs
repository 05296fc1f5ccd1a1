//! REST client for the automation sidecar.
//!
//! The sidecar is an out-of-process automation engine that owns the real
//! browser and the agent loop. This wrapper covers its HTTP surface using
//! [`reqwest`].

use serde::{Deserialize, Serialize};
use webpilot_core::backend::BackendClient;
use webpilot_core::job::{ContextConfig, InitialAction, SensitiveData};
use webpilot_core::types::JobId;

/// HTTP client for a single sidecar.
#[derive(Clone)]
pub struct SidecarApi {
    client: reqwest::Client,
    base_url: String,
}

/// Body of `POST /browser/launch`.
#[derive(Debug, Serialize)]
pub struct LaunchRequest<'a> {
    pub headless: bool,
    pub disable_security: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_binary_path: Option<&'a str>,
}

/// Response of `POST /contexts`.
#[derive(Debug, Deserialize)]
pub struct CreateContextResponse {
    pub context_id: String,
}

/// Body of `POST /agent/run`.
#[derive(Debug, Serialize)]
pub struct AgentRunRequest<'a> {
    pub job_id: JobId,
    pub task: &'a str,
    pub llm: &'a BackendClient,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive_data: Option<&'a SensitiveData>,
    pub initial_actions: &'a [InitialAction],
    /// `None` runs against the shared browser.
    pub context_id: Option<&'a str>,
    pub return_screenshots: bool,
}

/// Response of `POST /agent/run`.
#[derive(Debug, Default, Deserialize)]
pub struct AgentRunResponse {
    #[serde(default)]
    pub final_result: Option<String>,
    #[serde(default)]
    pub screenshots: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// `configuration`, `navigation`, `timeout`, or anything else.
    #[serde(default)]
    pub error_kind: Option<String>,
}

/// Errors from the sidecar REST layer.
#[derive(Debug, thiserror::Error)]
pub enum SidecarApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The sidecar returned a non-2xx status code.
    #[error("Sidecar API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl SidecarApi {
    /// * `base_url` - e.g. `http://127.0.0.1:9222`, without trailing slash.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /health`.
    pub async fn health(&self) -> Result<(), SidecarApiError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// `POST /browser/launch`.
    pub async fn launch_browser(&self, request: &LaunchRequest<'_>) -> Result<(), SidecarApiError> {
        let response = self
            .client
            .post(format!("{}/browser/launch", self.base_url))
            .json(request)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// `POST /browser/close`.
    pub async fn close_browser(&self) -> Result<(), SidecarApiError> {
        let response = self
            .client
            .post(format!("{}/browser/close", self.base_url))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// `POST /contexts` with the effective context settings.
    pub async fn create_context(
        &self,
        config: &ContextConfig,
    ) -> Result<CreateContextResponse, SidecarApiError> {
        let response = self
            .client
            .post(format!("{}/contexts", self.base_url))
            .json(config)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `DELETE /contexts/{id}`.
    pub async fn close_context(&self, context_id: &str) -> Result<(), SidecarApiError> {
        let response = self
            .client
            .delete(format!("{}/contexts/{}", self.base_url, context_id))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// `POST /agent/run`. Blocks until the agent finishes.
    pub async fn run_agent(
        &self,
        request: &AgentRunRequest<'_>,
    ) -> Result<AgentRunResponse, SidecarApiError> {
        let response = self
            .client
            .post(format!("{}/agent/run", self.base_url))
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `POST /agent/{job_id}/cancel`. Best effort.
    pub async fn cancel_agent(&self, job_id: JobId) -> Result<(), SidecarApiError> {
        let response = self
            .client
            .post(format!("{}/agent/{}/cancel", self.base_url, job_id))
            .send()
            .await?;

        Self::check_status(response).await
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, SidecarApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SidecarApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SidecarApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), SidecarApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
