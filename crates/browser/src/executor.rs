//! Contract with the external automation executor.
//!
//! The executor is the component that actually reasons about a task and
//! drives the browser. The dispatcher treats it as opaque: it hands over an
//! [`Invocation`] and gets back an [`ExecutorOutput`] or an
//! [`ExecutorError`] whose message ends up in the callback payload.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use webpilot_core::backend::BackendClient;
use webpilot_core::job::{InitialAction, SensitiveData};
use webpilot_core::types::JobId;

use crate::context::ExecutionContext;

/// Everything the executor needs for one run.
pub struct Invocation<'a> {
    pub job_id: JobId,
    pub task: &'a str,
    pub backend: &'a BackendClient,
    pub sensitive_data: Option<&'a SensitiveData>,
    pub initial_actions: &'a [InitialAction],
    pub context: &'a ExecutionContext,
    pub return_screenshots: bool,
    /// Fired when the job is cancelled. Executors should stop as soon as they
    /// can; the worker stops waiting either way.
    pub cancel: CancellationToken,
}

/// What a finished run reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorOutput {
    pub final_result: Option<String>,
    /// Ordered screenshots, already encoded (e.g. data URIs).
    pub screenshots: Vec<String>,
}

/// A failed run. The display string is delivered verbatim as the callback
/// `error`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Navigation(String),

    #[error("{0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait AutomationExecutor: Send + Sync {
    async fn run(&self, invocation: Invocation<'_>) -> Result<ExecutorOutput, ExecutorError>;
}
