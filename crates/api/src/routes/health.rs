use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use webpilot_browser::BrowserStatus;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub accepting_jobs: bool,
    pub jobs_in_flight: usize,
    pub browser: BrowserStatus,
}

/// GET /health -- returns service and shared browser health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let browser = state.browser.status().await;
    let accepting_jobs = state.dispatcher.is_accepting();

    let status = if browser.running && accepting_jobs {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        accepting_jobs,
        jobs_in_flight: state.dispatcher.in_flight(),
        browser,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
