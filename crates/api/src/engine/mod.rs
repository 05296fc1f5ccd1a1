//! Job execution engine.
//!
//! The dispatcher validates and schedules jobs onto background tasks; the
//! tracker keeps each job's latest status for the query and cancel
//! endpoints.

pub mod dispatcher;
pub mod tracker;
