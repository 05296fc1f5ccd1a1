//! Job dispatcher.
//!
//! Validates a submission synchronously and hands the job to a background
//! task. The accept path never waits on automation work; the HTTP reply goes
//! out as soon as the task is spawned.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use webpilot_core::error::CoreError;
use webpilot_core::job::{validate_job_request, JobRequest};
use webpilot_core::status::JobStatus;
use webpilot_core::types::{new_job_id, JobId};
use webpilot_events::JobEvent;
use webpilot_worker::{process_job, WorkerDeps};

use crate::engine::tracker::JobTracker;

/// A job that passed validation and is now running in the background.
#[derive(Debug, Clone, Copy)]
pub struct Accepted {
    pub job_id: JobId,
}

/// Schedules accepted jobs and drains them on shutdown.
pub struct JobDispatcher {
    deps: WorkerDeps,
    tracker: Arc<JobTracker>,
    tasks: TaskTracker,
    /// Parent of every job's cancellation token.
    cancel_all: CancellationToken,
}

impl JobDispatcher {
    pub fn new(deps: WorkerDeps, tracker: Arc<JobTracker>) -> Self {
        Self {
            deps,
            tracker,
            tasks: TaskTracker::new(),
            cancel_all: CancellationToken::new(),
        }
    }

    /// Validate `request` and start it in the background.
    ///
    /// On a validation failure nothing is scheduled.
    pub async fn dispatch(&self, request: JobRequest) -> Result<Accepted, CoreError> {
        if self.tasks.is_closed() {
            return Err(CoreError::Unavailable(
                "Server is shutting down; not accepting new jobs".into(),
            ));
        }

        let job = validate_job_request(request)?;
        let job_id = new_job_id();
        let cancel = self.cancel_all.child_token();

        self.tracker.register(job_id, cancel.clone()).await;
        self.deps
            .events
            .publish(JobEvent::new(job_id, JobStatus::Accepted));

        tracing::info!(
            %job_id,
            model = %job.model,
            callback_url = %job.callback_url,
            initial_actions = job.initial_actions.len(),
            has_sensitive_data = job.sensitive.is_some(),
            has_context_overrides = job.context_config.is_some(),
            "Job accepted",
        );

        self.tasks
            .spawn(process_job(self.deps.clone(), job_id, job, cancel));

        Ok(Accepted { job_id })
    }

    /// Jobs currently executing or delivering.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_accepting(&self) -> bool {
        !self.tasks.is_closed()
    }

    /// Stop accepting jobs and drain the ones in flight.
    ///
    /// Waits up to `timeout` for jobs to finish on their own, then cancels
    /// the rest and waits up to `timeout` again for their cleanup and
    /// cancellation callbacks.
    pub async fn shutdown(&self, timeout: Duration) {
        self.tasks.close();
        let in_flight = self.tasks.len();
        if in_flight == 0 {
            tracing::info!("Job dispatcher stopped, no jobs in flight");
            return;
        }

        tracing::info!(in_flight, "Waiting for in-flight jobs to finish");
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok() {
            tracing::info!("All in-flight jobs finished");
            return;
        }

        tracing::warn!(
            remaining = self.tasks.len(),
            "Drain timed out, cancelling remaining jobs",
        );
        self.cancel_all.cancel();
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_err() {
            tracing::error!(
                remaining = self.tasks.len(),
                "Jobs still running after cancellation, abandoning them",
            );
        }
    }
}
