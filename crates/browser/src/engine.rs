//! Trait seams a browser engine implements.
//!
//! The dispatcher never drives pages itself. It only needs to start one
//! shared browser, carve isolated contexts out of it, and close both.

use std::sync::Arc;

use async_trait::async_trait;
use webpilot_core::job::ContextConfig;

use crate::config::BrowserConfig;
use crate::error::BrowserError;

/// Starts the process-wide shared browser.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, config: &BrowserConfig) -> Result<Arc<dyn SharedBrowser>, BrowserError>;
}

/// The long-lived browser process. Job logic never mutates it directly.
#[async_trait]
pub trait SharedBrowser: Send + Sync {
    /// Build a fresh context with its own cookies, storage and pages.
    async fn new_context(
        &self,
        config: &ContextConfig,
    ) -> Result<Arc<dyn BrowserContext>, BrowserError>;

    /// Shut the browser down. Called at most once by the manager.
    async fn close(&self) -> Result<(), BrowserError>;
}

/// An isolated per-job derivative of the shared browser.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    /// Engine-assigned identifier, used by executors to address the context.
    fn id(&self) -> &str;

    async fn close(&self) -> Result<(), BrowserError>;
}
