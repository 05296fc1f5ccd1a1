//! Background execution of one accepted job.
//!
//! [`execute_job`] turns a validated job into a [`JobOutcome`]: pick the
//! backend, check out a browser context, run the automation executor, and
//! release the context. [`process_job`] wraps that with status events and
//! callback delivery and is what the dispatcher spawns.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use webpilot_browser::{AutomationExecutor, BrowserManager, ExecutorError, ExecutorOutput, Invocation};
use webpilot_core::job::ValidatedJob;
use webpilot_core::result::{JobResult, NO_FINAL_RESULT_MESSAGE};
use webpilot_core::status::JobStatus;
use webpilot_core::types::JobId;
use webpilot_events::{CallbackDelivery, DeliveryOutcome, JobEvent, JobEventBus};

use crate::registry::BackendRegistry;

/// How long an executor may keep running after its job is cancelled before
/// it is abandoned.
pub const CANCEL_GRACE: Duration = Duration::from_secs(10);

/// Everything a job needs from the process. Cheap to clone.
#[derive(Clone)]
pub struct WorkerDeps {
    pub browser: Arc<BrowserManager>,
    pub executor: Arc<dyn AutomationExecutor>,
    pub registry: Arc<BackendRegistry>,
    pub delivery: Arc<CallbackDelivery>,
    pub events: Arc<JobEventBus>,
}

/// How a job's execution ended, with the payload to deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(JobResult),
    Failed(JobResult),
    Cancelled(JobResult),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed(_) => JobStatus::Completed,
            JobOutcome::Failed(_) => JobStatus::Failed,
            JobOutcome::Cancelled(_) => JobStatus::Cancelled,
        }
    }

    pub fn result(&self) -> &JobResult {
        match self {
            JobOutcome::Completed(r) | JobOutcome::Failed(r) | JobOutcome::Cancelled(r) => r,
        }
    }

    pub fn into_result(self) -> JobResult {
        match self {
            JobOutcome::Completed(r) | JobOutcome::Failed(r) | JobOutcome::Cancelled(r) => r,
        }
    }
}

/// Run one job to an outcome. Never fails: every fault becomes a
/// `JobOutcome::Failed` carrying the message for the callback.
///
/// An isolated context is released before this returns, whatever the path.
pub async fn execute_job(
    deps: &WorkerDeps,
    job_id: JobId,
    job: &ValidatedJob,
    cancel: CancellationToken,
) -> JobOutcome {
    let backend = match deps.registry.select(&job.model).await {
        Ok(backend) => backend,
        Err(e) => {
            tracing::warn!(%job_id, model = %job.model, error = %e, "Backend selection failed");
            return JobOutcome::Failed(JobResult::failure(e.to_string()));
        }
    };

    if cancel.is_cancelled() {
        return JobOutcome::Cancelled(JobResult::cancelled());
    }

    let context = match deps.browser.checkout(job.context_config.as_ref()).await {
        Ok(context) => context,
        Err(e) => {
            tracing::error!(%job_id, error = %e, "Browser context checkout failed");
            return JobOutcome::Failed(JobResult::failure(format!(
                "browser context unavailable: {e}"
            )));
        }
    };

    tracing::info!(
        %job_id,
        provider = %backend.provider,
        model = %backend.model,
        isolated = context.is_isolated(),
        context_id = context.context_id().unwrap_or("shared"),
        "Running automation",
    );

    let invocation = Invocation {
        job_id,
        task: &job.task,
        backend: &backend,
        sensitive_data: job.sensitive.as_ref(),
        initial_actions: &job.initial_actions,
        context: &context,
        return_screenshots: job.return_screenshots,
        cancel: cancel.clone(),
    };

    // The executor sees the token first; one that ignores it is dropped after
    // the grace period. A panicking executor still ends in a failed result.
    let run = AssertUnwindSafe(deps.executor.run(invocation)).catch_unwind();
    let run_result = tokio::select! {
        result = run => result.unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            tracing::error!(%job_id, panic = %message, "Executor panicked");
            Err(ExecutorError::Failed(format!("automation engine crashed: {message}")))
        }),
        _ = async {
            cancel.cancelled().await;
            tokio::time::sleep(CANCEL_GRACE).await;
        } => {
            tracing::warn!(%job_id, "Executor ignored cancellation, abandoning run");
            Err(ExecutorError::Cancelled)
        }
    };

    if let Err(e) = context.release().await {
        tracing::warn!(%job_id, error = %e, "Failed to release browser context");
    }

    into_outcome(job_id, job, run_result)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn into_outcome(
    job_id: JobId,
    job: &ValidatedJob,
    run_result: Result<ExecutorOutput, ExecutorError>,
) -> JobOutcome {
    match run_result {
        Ok(ExecutorOutput {
            final_result: Some(final_result),
            screenshots,
        }) => {
            let screenshots = job.return_screenshots.then_some(screenshots);
            JobOutcome::Completed(JobResult::success(final_result, screenshots))
        }
        Ok(ExecutorOutput {
            final_result: None, ..
        }) => {
            tracing::warn!(%job_id, "Executor finished without a final result");
            JobOutcome::Failed(JobResult::failure(NO_FINAL_RESULT_MESSAGE))
        }
        Err(ExecutorError::Cancelled) => JobOutcome::Cancelled(JobResult::cancelled()),
        Err(e) => {
            tracing::warn!(%job_id, error = %e, "Automation failed");
            JobOutcome::Failed(JobResult::failure(e.to_string()))
        }
    }
}

/// Execute a job and deliver its result, publishing each status change.
pub async fn process_job(
    deps: WorkerDeps,
    job_id: JobId,
    job: ValidatedJob,
    cancel: CancellationToken,
) -> DeliveryOutcome {
    deps.events.publish(JobEvent::new(job_id, JobStatus::Running));

    let outcome = execute_job(&deps, job_id, &job, cancel).await;
    let mut event = JobEvent::new(job_id, outcome.status());
    if let Some(error) = &outcome.result().error {
        event = event.with_detail(error.clone());
    }
    deps.events.publish(event);

    let delivery = deps
        .delivery
        .deliver(job_id, &job.callback_url, outcome.result())
        .await;

    match &delivery {
        DeliveryOutcome::Delivered { .. } => {
            deps.events.publish(JobEvent::new(job_id, JobStatus::CallbackSent));
        }
        DeliveryOutcome::Failed { reason, .. } => {
            deps.events
                .publish(JobEvent::new(job_id, JobStatus::CallbackFailed).with_detail(reason.clone()));
        }
    }

    delivery
}
