//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`JobEventBus`] carries every job status transition. It is shared via
//! `Arc<JobEventBus>`; the job tracker and the log sink subscribe to it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use webpilot_core::status::JobStatus;
use webpilot_core::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A job moved to a new status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Human-readable context, e.g. the fault message on `Failed`.
    pub detail: Option<String>,
    pub timestamp: Timestamp,
}

impl JobEvent {
    pub fn new(job_id: JobId, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ---------------------------------------------------------------------------
// JobEventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for [`JobEvent`]s.
///
/// ```rust
/// use webpilot_core::status::JobStatus;
/// use webpilot_core::types::new_job_id;
/// use webpilot_events::bus::{JobEvent, JobEventBus};
///
/// let bus = JobEventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(JobEvent::new(new_job_id(), JobStatus::Accepted));
/// ```
pub struct JobEventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl JobEventBus {
    /// When the buffer is full the oldest events are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers; dropped silently if there are none.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Log every event until the bus is dropped.
pub async fn run_log_sink(mut rx: broadcast::Receiver<JobEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match event.status {
                JobStatus::Failed | JobStatus::CallbackFailed => tracing::warn!(
                    job_id = %event.job_id,
                    status = %event.status,
                    detail = event.detail.as_deref().unwrap_or(""),
                    "Job status changed",
                ),
                _ => tracing::info!(
                    job_id = %event.job_id,
                    status = %event.status,
                    "Job status changed",
                ),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Job event log sink lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
