//! In-memory registry of accepted jobs.
//!
//! [`JobTracker`] is fed by the [`JobEventBus`](webpilot_events::JobEventBus)
//! and holds each job's cancellation token so the API can cancel it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use webpilot_core::error::CoreError;
use webpilot_core::status::JobStatus;
use webpilot_core::types::{JobId, Timestamp};
use webpilot_events::JobEvent;

/// How often the pruner sweeps finished jobs.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Point-in-time view of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Fault message for failed jobs and failed deliveries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub accepted_at: Timestamp,
    pub updated_at: Timestamp,
}

struct TrackedJob {
    snapshot: JobSnapshot,
    cancel: CancellationToken,
}

#[derive(Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<JobId, TrackedJob>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a freshly accepted job.
    pub async fn register(&self, job_id: JobId, cancel: CancellationToken) {
        let now = Utc::now();
        let snapshot = JobSnapshot {
            job_id,
            status: JobStatus::Accepted,
            detail: None,
            accepted_at: now,
            updated_at: now,
        };
        self.jobs
            .write()
            .await
            .insert(job_id, TrackedJob { snapshot, cancel });
    }

    /// Apply a status change. Unknown jobs and backward or sideways moves are
    /// ignored; returns whether the change was applied.
    ///
    /// Forward moves may skip stages, so a job whose intermediate events were
    /// lost on a lagging bus still reaches its real status.
    pub async fn set_status(&self, job_id: JobId, status: JobStatus, detail: Option<String>) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&job_id) else {
            return false;
        };
        let current = job.snapshot.status;
        if !current.precedes(status) {
            tracing::debug!(%job_id, from = %current, to = %status, "Ignoring status update");
            return false;
        }
        if !current.can_transition_to(status) {
            tracing::debug!(%job_id, from = %current, to = %status, "Status update skipped stages");
        }
        job.snapshot.status = status;
        if detail.is_some() {
            job.snapshot.detail = detail;
        }
        job.snapshot.updated_at = Utc::now();
        true
    }

    pub async fn get(&self, job_id: JobId) -> Option<JobSnapshot> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .map(|job| job.snapshot.clone())
    }

    /// Request cancellation of a job that has not finished executing.
    ///
    /// Best effort: the token is fired and the worker decides how the run
    /// ends. Cancelling twice is harmless.
    pub async fn cancel(&self, job_id: JobId) -> Result<JobSnapshot, CoreError> {
        let jobs = self.jobs.read().await;
        let job = jobs.get(&job_id).ok_or(CoreError::NotFound(job_id))?;
        if job.snapshot.status.is_finished() {
            return Err(CoreError::Conflict(format!(
                "Job {job_id} already finished with status {}",
                job.snapshot.status
            )));
        }
        job.cancel.cancel();
        tracing::info!(%job_id, status = %job.snapshot.status, "Job cancellation requested");
        Ok(job.snapshot.clone())
    }

    /// Forget jobs whose callback settled more than `retention` ago.
    pub async fn prune_finished(&self, retention: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            return 0;
        };
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.snapshot.status.is_terminal() && job.snapshot.updated_at < cutoff));
        before - jobs.len()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Apply bus events until the bus is dropped.
    pub async fn run(self: Arc<Self>, mut rx: broadcast::Receiver<JobEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    self.set_status(event.job_id, event.status, event.detail).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Job tracker lagged behind the event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Periodically prune settled jobs until `cancel` fires.
    pub async fn run_pruner(self: Arc<Self>, retention: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let pruned = self.prune_finished(retention).await;
                    if pruned > 0 {
                        tracing::debug!(pruned, "Pruned settled jobs");
                    }
                }
            }
        }
    }
}
