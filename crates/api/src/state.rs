use std::sync::Arc;

use webpilot_browser::BrowserManager;

use crate::engine::dispatcher::JobDispatcher;
use crate::engine::tracker::JobTracker;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Owner of the shared browser.
    pub browser: Arc<BrowserManager>,
    pub dispatcher: Arc<JobDispatcher>,
    pub tracker: Arc<JobTracker>,
}
