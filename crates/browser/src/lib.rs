//! Shared automation resource, per-job execution contexts, and the contract
//! with the external automation executor.
//!
//! - [`manager::BrowserManager`] owns the single long-lived browser for the
//!   process and hands out isolated [`context::ExecutionContext`]s.
//! - [`engine`] defines the trait seams a browser engine implements.
//! - [`executor::AutomationExecutor`] is the one call the worker makes into
//!   the engine.
//! - [`sidecar`] binds all of the above to an out-of-process engine over HTTP.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod manager;
pub mod sidecar;

pub use config::BrowserConfig;
pub use context::{ContextLease, ExecutionContext};
pub use engine::{BrowserContext, BrowserLauncher, SharedBrowser};
pub use error::BrowserError;
pub use executor::{AutomationExecutor, ExecutorError, ExecutorOutput, Invocation};
pub use manager::{BrowserManager, BrowserStatus};
