//! Job lifecycle events and callback delivery.
//!
//! - [`JobEventBus`]: in-process publish/subscribe hub for job status
//!   transitions, backed by `tokio::sync::broadcast`.
//! - [`delivery`]: POSTs terminal job results to the caller's callback
//!   endpoint with bounded retry, parking undeliverable results in an
//!   [`OverflowStore`](delivery::overflow::OverflowStore).

pub mod bus;
pub mod delivery;

pub use bus::{JobEvent, JobEventBus};
pub use delivery::callback::{
    CallbackDelivery, DeliveryConfig, DeliveryFault, DeliveryOutcome, ReplaySummary,
};
pub use delivery::overflow::{FileOverflowStore, OverflowRecord, OverflowStore};
pub use delivery::retry::RetryPolicy;
