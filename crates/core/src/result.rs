//! The terminal outcome of a job, as delivered to the callback endpoint.

use serde::{Deserialize, Serialize};

/// Message used when the executor finished without reporting anything.
pub const NO_FINAL_RESULT_MESSAGE: &str = "automation finished without a final result";

/// Message delivered when a job was cancelled before it finished.
pub const CANCELLED_MESSAGE: &str = "job cancelled";

/// Callback payload.
///
/// Exactly one of `final_result` / `error` is set. `screenshots` is only
/// present when the request asked for them and the job succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshots: Option<Vec<String>>,
}

impl JobResult {
    pub fn success(final_result: impl Into<String>, screenshots: Option<Vec<String>>) -> Self {
        Self {
            final_result: Some(final_result.into()),
            error: None,
            screenshots,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            final_result: None,
            error: Some(error.into()),
            screenshots: None,
        }
    }

    pub fn cancelled() -> Self {
        Self::failure(CANCELLED_MESSAGE)
    }

    pub fn is_success(&self) -> bool {
        self.final_result.is_some() && self.error.is_none()
    }
}
