//! Background execution of accepted jobs.
//!
//! [`registry`] maps a requested model name to an LLM backend; [`worker`]
//! runs one job against the shared browser and delivers its result.

pub mod registry;
pub mod worker;

pub use registry::{BackendBuilder, BackendCredentials, BackendRegistry, ModelPattern};
pub use worker::{execute_job, process_job, JobOutcome, WorkerDeps};
