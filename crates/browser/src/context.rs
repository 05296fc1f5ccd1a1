//! Per-job execution contexts and the lease that guarantees their release.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use webpilot_core::job::ContextConfig;

use crate::engine::{BrowserContext, SharedBrowser};
use crate::error::BrowserError;

/// What a job runs against.
pub enum ExecutionContext {
    /// The shared browser itself. Only handed out when isolation is disabled.
    Shared(Arc<dyn SharedBrowser>),
    /// A context owned by exactly one job.
    Isolated(ContextLease),
}

impl ExecutionContext {
    pub fn is_isolated(&self) -> bool {
        matches!(self, ExecutionContext::Isolated(_))
    }

    /// Identifier of the isolated context, `None` for the shared browser.
    pub fn context_id(&self) -> Option<&str> {
        match self {
            ExecutionContext::Shared(_) => None,
            ExecutionContext::Isolated(lease) => Some(lease.id()),
        }
    }

    /// Effective context settings, `None` for the shared browser.
    pub fn config(&self) -> Option<&ContextConfig> {
        match self {
            ExecutionContext::Shared(_) => None,
            ExecutionContext::Isolated(lease) => Some(lease.config()),
        }
    }

    /// Release the context. A no-op for the shared browser, which outlives
    /// every job.
    pub async fn release(self) -> Result<(), BrowserError> {
        match self {
            ExecutionContext::Shared(_) => Ok(()),
            ExecutionContext::Isolated(lease) => lease.release().await,
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionContext::Shared(_) => f.write_str("ExecutionContext::Shared"),
            ExecutionContext::Isolated(lease) => f
                .debug_tuple("ExecutionContext::Isolated")
                .field(&lease.id())
                .finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Lease
// ---------------------------------------------------------------------------

/// Counters shared between the manager and its outstanding leases.
#[derive(Debug, Default)]
pub(crate) struct ContextStats {
    pub(crate) live: AtomicUsize,
    pub(crate) created: AtomicU64,
    pub(crate) released: AtomicU64,
}

/// Exclusive ownership of an isolated context.
///
/// The context is closed exactly once: either through [`ContextLease::release`]
/// or, if the owning job future is dropped first, from `Drop` on the current
/// Tokio runtime.
pub struct ContextLease {
    context: Arc<dyn BrowserContext>,
    config: ContextConfig,
    stats: Arc<ContextStats>,
    released: bool,
}

impl ContextLease {
    pub(crate) fn new(
        context: Arc<dyn BrowserContext>,
        config: ContextConfig,
        stats: Arc<ContextStats>,
    ) -> Self {
        stats.created.fetch_add(1, Ordering::Relaxed);
        stats.live.fetch_add(1, Ordering::SeqCst);
        Self {
            context,
            config,
            stats,
            released: false,
        }
    }

    pub fn id(&self) -> &str {
        self.context.id()
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<dyn BrowserContext> {
        &self.context
    }

    /// Close the context now and wait for the engine to confirm.
    pub async fn release(mut self) -> Result<(), BrowserError> {
        self.released = true;
        close_context(Arc::clone(&self.context), Arc::clone(&self.stats)).await
    }
}

impl Drop for ContextLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let context = Arc::clone(&self.context);
        let stats = Arc::clone(&self.stats);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(context_id = %context.id(), "Releasing dropped context lease");
                handle.spawn(async move {
                    let _ = close_context(context, stats).await;
                });
            }
            Err(_) => {
                stats.live.fetch_sub(1, Ordering::SeqCst);
                tracing::warn!(
                    context_id = %context.id(),
                    "Context lease dropped outside a runtime; context left to the engine",
                );
            }
        }
    }
}

async fn close_context(
    context: Arc<dyn BrowserContext>,
    stats: Arc<ContextStats>,
) -> Result<(), BrowserError> {
    let result = context.close().await;
    stats.live.fetch_sub(1, Ordering::SeqCst);
    stats.released.fetch_add(1, Ordering::Relaxed);

    match &result {
        Ok(()) => tracing::debug!(context_id = %context.id(), "Browser context released"),
        Err(e) => tracing::error!(
            context_id = %context.id(),
            error = %e,
            "Failed to release browser context",
        ),
    }
    result
}
