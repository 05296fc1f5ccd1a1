//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/api/v1/jobs`.
///
/// ```text
/// POST   /                -> submit_job
/// GET    /{id}            -> get_job
/// DELETE /{id}            -> cancel_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(jobs::submit_job))
        .route("/{id}", get(jobs::get_job).delete(jobs::cancel_job))
}

/// `POST /run`, the root-level alias of `POST /api/v1/jobs`.
pub fn legacy_router() -> Router<AppState> {
    Router::new().route("/run", post(jobs::submit_job))
}
