//! Domain types shared by every webpilot crate.
//!
//! This crate has zero internal dependencies: the job request and result
//! shapes, request validation, the job lifecycle state machine, the backend
//! client descriptor, and the common [`error::CoreError`] all live here so
//! the API, the worker and the delivery layer agree on them.

pub mod backend;
pub mod error;
pub mod job;
pub mod result;
pub mod status;
pub mod types;
