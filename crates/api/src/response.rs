//! Shared response envelope types for API handlers.

use serde::Serialize;
use webpilot_core::types::JobId;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Body of the `202 Accepted` reply to a job submission.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub detail: &'static str,
    pub job_id: JobId,
}

impl AcceptedResponse {
    pub fn scheduled(job_id: JobId) -> Self {
        Self {
            status: "accepted",
            detail: "Work scheduled",
            job_id,
        }
    }
}
