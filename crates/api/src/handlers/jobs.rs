//! Handlers for the `/jobs` resource.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use webpilot_core::error::CoreError;
use webpilot_core::job::JobRequest;
use webpilot_core::types::JobId;

use crate::error::AppResult;
use crate::response::{AcceptedResponse, DataResponse};
use crate::state::AppState;

/// POST /run, POST /api/v1/jobs
///
/// Validate and schedule a job. Returns 202 as soon as the job is running in
/// the background; the result is POSTed to the job's `callback_url`.
pub async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<JobRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = payload?;
    let accepted = state.dispatcher.dispatch(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse::scheduled(accepted.job_id)),
    ))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state
        .tracker
        .get(job_id)
        .await
        .ok_or(CoreError::NotFound(job_id))?;

    Ok(Json(DataResponse { data: snapshot }))
}

/// DELETE /api/v1/jobs/{id}
///
/// Request cancellation. Returns 202: the job ends asynchronously and its
/// callback receives `{"error": "job cancelled"}`.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.tracker.cancel(job_id).await?;

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: snapshot })))
}
