//! Delivery of terminal job results to caller-supplied callback endpoints.

pub mod callback;
pub mod overflow;
pub mod retry;
