//! Lifecycle owner of the process-wide shared browser.
//!
//! [`BrowserManager`] is created once at startup via
//! [`BrowserManager::start`] and threaded through the application state.
//! Jobs call [`BrowserManager::checkout`] to obtain an
//! [`ExecutionContext`]; the server calls [`BrowserManager::shutdown`]
//! once on the way out.
//!
//! Checkouts hold the read side of a lifecycle gate while a context is being
//! built, and shutdown takes the write side. Once teardown has started no
//! new context can begin construction.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use webpilot_core::job::ContextConfig;

use crate::config::BrowserConfig;
use crate::context::{ContextLease, ContextStats, ExecutionContext};
use crate::engine::{BrowserLauncher, SharedBrowser};
use crate::error::BrowserError;

/// Point-in-time view of the manager, exposed on the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BrowserStatus {
    pub running: bool,
    pub isolate_jobs: bool,
    pub live_contexts: usize,
    pub contexts_created: u64,
    pub contexts_released: u64,
}

/// Owns the shared browser for the lifetime of the process.
pub struct BrowserManager {
    browser: Arc<dyn SharedBrowser>,
    context_defaults: ContextConfig,
    isolate_jobs: bool,
    /// `true` once teardown has begun.
    closing: RwLock<bool>,
    stats: Arc<ContextStats>,
}

impl BrowserManager {
    /// Launch the shared browser and wrap it in a manager.
    ///
    /// A launch failure is returned to the caller, which is expected to abort
    /// startup.
    pub async fn start(
        launcher: &dyn BrowserLauncher,
        config: &BrowserConfig,
    ) -> Result<Arc<Self>, BrowserError> {
        tracing::info!(
            headless = config.headless,
            disable_security = config.disable_security,
            binary_path = ?config.binary_path,
            "Launching shared browser",
        );
        let browser = launcher.launch(config).await?;

        if !config.isolate_jobs {
            tracing::warn!(
                "Job isolation disabled: jobs without context overrides share one browser \
                 and can observe each other's navigation",
            );
        }

        tracing::info!(isolate_jobs = config.isolate_jobs, "Shared browser launched");
        Ok(Arc::new(Self::new(
            browser,
            config.context_defaults.clone(),
            config.isolate_jobs,
        )))
    }

    /// Wrap an already running browser.
    pub fn new(
        browser: Arc<dyn SharedBrowser>,
        context_defaults: ContextConfig,
        isolate_jobs: bool,
    ) -> Self {
        Self {
            browser,
            context_defaults,
            isolate_jobs,
            closing: RwLock::new(false),
            stats: Arc::new(ContextStats::default()),
        }
    }

    /// Hand out an execution context for one job.
    ///
    /// Builds an isolated context from the manager defaults layered under the
    /// job's `overrides`. Only when isolation is disabled and the job has no
    /// overrides is the shared browser itself returned.
    pub async fn checkout(
        &self,
        overrides: Option<&ContextConfig>,
    ) -> Result<ExecutionContext, BrowserError> {
        let closing = self.closing.read().await;
        if *closing {
            return Err(BrowserError::ShuttingDown);
        }

        if !self.isolate_jobs && overrides.is_none() {
            return Ok(ExecutionContext::Shared(Arc::clone(&self.browser)));
        }

        let config = match overrides {
            Some(o) => o.merged_over(&self.context_defaults),
            None => self.context_defaults.clone(),
        };
        let context = self.browser.new_context(&config).await?;
        tracing::debug!(context_id = %context.id(), "Browser context created");

        let lease = ContextLease::new(context, config, Arc::clone(&self.stats));
        drop(closing);
        Ok(ExecutionContext::Isolated(lease))
    }

    /// Close the shared browser. Safe to call any number of times; only the
    /// first call reaches the engine.
    pub async fn shutdown(&self) -> Result<(), BrowserError> {
        let mut closing = self.closing.write().await;
        if *closing {
            tracing::debug!("Browser manager already shut down");
            return Ok(());
        }
        *closing = true;

        let live = self.stats.live.load(Ordering::SeqCst);
        if live > 0 {
            tracing::warn!(live_contexts = live, "Closing browser with contexts still leased");
        }

        tracing::info!("Closing shared browser");
        match self.browser.close().await {
            Ok(()) => {
                tracing::info!("Shared browser closed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to close shared browser");
                Err(e)
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        !*self.closing.read().await
    }

    pub async fn status(&self) -> BrowserStatus {
        BrowserStatus {
            running: self.is_running().await,
            isolate_jobs: self.isolate_jobs,
            live_contexts: self.stats.live.load(Ordering::SeqCst),
            contexts_created: self.stats.created.load(Ordering::Relaxed),
            contexts_released: self.stats.released.load(Ordering::Relaxed),
        }
    }
}
