/// Errors raised by the shared browser or one of its contexts.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    /// The shared browser could not be started.
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    /// An isolated context could not be built.
    #[error("Failed to create browser context: {0}")]
    ContextCreation(String),

    /// Closing the browser or a context failed.
    #[error("Failed to close {target}: {reason}")]
    Close { target: String, reason: String },

    /// Teardown has begun; no new contexts are handed out.
    #[error("Browser manager is shutting down")]
    ShuttingDown,
}
