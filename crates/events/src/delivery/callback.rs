//! Callback delivery with exponential-backoff retry.
//!
//! [`CallbackDelivery`] POSTs a JSON-encoded [`JobResult`] to the URL the
//! caller supplied with the job. Failed attempts are retried according to a
//! [`RetryPolicy`]; when every attempt fails the payload is handed to the
//! configured [`OverflowStore`] and the fault is reported as
//! [`DeliveryOutcome::Failed`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use url::Url;
use webpilot_core::result::JobResult;
use webpilot_core::types::JobId;

use super::overflow::{FileOverflowStore, OverflowError, OverflowRecord, OverflowStore};
use super::retry::RetryPolicy;

/// Header carrying the job id on every callback request.
pub const JOB_ID_HEADER: &str = "x-webpilot-job-id";

/// Default per-attempt timeout. Generous so slow receivers still succeed.
const DEFAULT_TIMEOUT_SECS: u64 = 200;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Timeout for a single POST.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// JSON-lines file for undeliverable results; disabled when `None`.
    pub overflow_path: Option<PathBuf>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            overflow_path: None,
        }
    }
}

impl DeliveryConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default |
    /// |-----------------------------|---------|
    /// | `CALLBACK_TIMEOUT_SECS`     | `200`   |
    /// | `CALLBACK_MAX_RETRIES`      | `3`     |
    /// | `CALLBACK_RETRY_INITIAL_MS` | `1000`  |
    /// | `CALLBACK_RETRY_MAX_SECS`   | `30`    |
    /// | `CALLBACK_OVERFLOW_PATH`    | unset   |
    pub fn from_env() -> Self {
        let timeout_secs: u64 = std::env::var("CALLBACK_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string())
            .parse()
            .expect("CALLBACK_TIMEOUT_SECS must be a valid u64");

        let max_retries: u32 = std::env::var("CALLBACK_MAX_RETRIES")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("CALLBACK_MAX_RETRIES must be a valid u32");

        let initial_ms: u64 = std::env::var("CALLBACK_RETRY_INITIAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("CALLBACK_RETRY_INITIAL_MS must be a valid u64");

        let max_secs: u64 = std::env::var("CALLBACK_RETRY_MAX_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("CALLBACK_RETRY_MAX_SECS must be a valid u64");

        let overflow_path = std::env::var("CALLBACK_OVERFLOW_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self {
            timeout: Duration::from_secs(timeout_secs),
            retry: RetryPolicy {
                max_retries,
                initial_delay: Duration::from_millis(initial_ms),
                max_delay: Duration::from_secs(max_secs),
                ..Default::default()
            },
            overflow_path,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome / error
// ---------------------------------------------------------------------------

/// A single failed delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryFault {
    /// The HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The receiver returned a non-2xx status code.
    #[error("Callback returned HTTP {0}")]
    HttpStatus(u16),
}

/// Final result of delivering one job's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        attempts: u32,
    },
    Failed {
        reason: String,
        attempts: u32,
        /// The payload was parked in the overflow store.
        stored: bool,
    },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Counts from one pass over the overflow store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub delivered: usize,
    /// Failed again; parked anew if an overflow store is configured.
    pub failed: usize,
    /// Records whose callback URL no longer parses.
    pub discarded: usize,
}

// ---------------------------------------------------------------------------
// CallbackDelivery
// ---------------------------------------------------------------------------

/// Delivers job results to callback endpoints.
pub struct CallbackDelivery {
    client: reqwest::Client,
    retry: RetryPolicy,
    overflow: Option<Arc<dyn OverflowStore>>,
}

impl CallbackDelivery {
    /// Create a delivery service with a client bound to `config.timeout`.
    pub fn new(config: &DeliveryConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            retry: config.retry.clone(),
            overflow: None,
        })
    }

    /// Park undeliverable results in `store`.
    pub fn with_overflow(mut self, store: Arc<dyn OverflowStore>) -> Self {
        self.overflow = Some(store);
        self
    }

    /// Deliver `result` to `url`, retrying with backoff.
    ///
    /// Never returns an error: the outcome, including faults, is reported as
    /// a [`DeliveryOutcome`] and logged here.
    pub async fn deliver(&self, job_id: JobId, url: &Url, result: &JobResult) -> DeliveryOutcome {
        let delays = self.retry.delays();
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0u32;

        let last_err = loop {
            attempt += 1;
            match self.try_send(job_id, url, result).await {
                Ok(()) => {
                    tracing::info!(%job_id, %url, attempt, "Callback delivered");
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(e) if attempt < max_attempts => {
                    let delay = delays[(attempt - 1) as usize];
                    tracing::warn!(
                        %job_id,
                        %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Callback delivery attempt failed, retrying",
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break e,
            }
        };

        let reason = last_err.to_string();
        tracing::error!(
            %job_id,
            %url,
            attempts = attempt,
            error = %reason,
            "Callback delivery failed after all retries",
        );

        let stored = self.park(job_id, url, result, &reason, attempt).await;
        DeliveryOutcome::Failed {
            reason,
            attempts: attempt,
            stored,
        }
    }

    /// Redeliver every result parked in `store`, oldest first.
    ///
    /// Each record gets the full retry policy. Records that fail again are
    /// parked through [`with_overflow`](Self::with_overflow) as usual.
    pub async fn replay_parked(&self, store: &FileOverflowStore) -> Result<ReplaySummary, OverflowError> {
        let records = store.begin_replay().await?;
        let mut summary = ReplaySummary::default();
        if records.is_empty() {
            return Ok(summary);
        }
        tracing::info!(records = records.len(), "Replaying parked callback results");

        for record in records {
            let url = match Url::parse(&record.callback_url) {
                Ok(url) => url,
                Err(e) => {
                    tracing::error!(
                        job_id = %record.job_id,
                        callback_url = %record.callback_url,
                        error = %e,
                        "Discarding parked result with invalid callback URL",
                    );
                    summary.discarded += 1;
                    continue;
                }
            };
            if self.deliver(record.job_id, &url, &record.payload).await.is_delivered() {
                summary.delivered += 1;
            } else {
                summary.failed += 1;
            }
        }

        store.finish_replay().await?;
        tracing::info!(
            delivered = summary.delivered,
            failed = summary.failed,
            discarded = summary.discarded,
            "Overflow replay finished",
        );
        Ok(summary)
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, job_id: JobId, url: &Url, result: &JobResult) -> Result<(), DeliveryFault> {
        let response = self
            .client
            .post(url.clone())
            .header(JOB_ID_HEADER, job_id.to_string())
            .json(result)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeliveryFault::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }

    async fn park(
        &self,
        job_id: JobId,
        url: &Url,
        result: &JobResult,
        reason: &str,
        attempts: u32,
    ) -> bool {
        let Some(store) = &self.overflow else {
            return false;
        };

        let record = OverflowRecord::new(job_id, url.as_str(), result.clone(), reason, attempts);
        match store.store(&record).await {
            Ok(()) => {
                tracing::info!(%job_id, "Undelivered result written to overflow store");
                true
            }
            Err(e) => {
                tracing::error!(%job_id, error = %e, "Failed to write overflow record");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::sync::Mutex;
    use webpilot_core::types::new_job_id;

    use super::*;

    /// Callback receiver that fails the first `fail_first` requests.
    struct Receiver {
        fail_first: u32,
        hits: AtomicU32,
        received: Mutex<Vec<(Option<String>, serde_json::Value)>>,
    }

    async fn spawn_receiver(fail_first: u32) -> (Url, Arc<Receiver>) {
        let receiver = Arc::new(Receiver {
            fail_first,
            hits: AtomicU32::new(0),
            received: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route(
                "/callback",
                post(
                    |State(r): State<Arc<Receiver>>,
                     headers: HeaderMap,
                     Json(body): Json<serde_json::Value>| async move {
                        let n = r.hits.fetch_add(1, Ordering::SeqCst);
                        if n < r.fail_first {
                            return StatusCode::SERVICE_UNAVAILABLE;
                        }
                        let job_id = headers
                            .get(JOB_ID_HEADER)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        r.received.lock().await.push((job_id, body));
                        StatusCode::OK
                    },
                ),
            )
            .with_state(Arc::clone(&receiver));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = Url::parse(&format!("http://{addr}/callback")).unwrap();
        (url, receiver)
    }

    fn fast_config(max_retries: u32) -> DeliveryConfig {
        DeliveryConfig {
            timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_retries,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                multiplier: 2.0,
            },
            overflow_path: None,
        }
    }

    #[tokio::test]
    async fn delivers_payload_and_job_id_header() {
        let (url, receiver) = spawn_receiver(0).await;
        let delivery = CallbackDelivery::new(&fast_config(3)).unwrap();
        let job_id = new_job_id();

        let outcome = delivery
            .deliver(job_id, &url, &JobResult::success("sunny, 20C", None))
            .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 1 });
        let received = receiver.received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0.as_deref(), Some(job_id.to_string().as_str()));
        assert_eq!(received[0].1, serde_json::json!({"final_result": "sunny, 20C"}));
    }

    #[tokio::test]
    async fn retries_until_receiver_recovers() {
        let (url, receiver) = spawn_receiver(2).await;
        let delivery = CallbackDelivery::new(&fast_config(3)).unwrap();

        let outcome = delivery
            .deliver(new_job_id(), &url, &JobResult::failure("navigation timeout"))
            .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 3 });
        assert_eq!(receiver.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_are_parked_in_overflow() {
        let (url, receiver) = spawn_receiver(u32::MAX).await;
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileOverflowStore::new(dir.path().join("overflow.jsonl")));
        let delivery = CallbackDelivery::new(&fast_config(2))
            .unwrap()
            .with_overflow(store.clone());
        let job_id = new_job_id();

        let outcome = delivery
            .deliver(job_id, &url, &JobResult::success("done", None))
            .await;

        assert_matches!(
            outcome,
            DeliveryOutcome::Failed { ref reason, attempts: 3, stored: true }
                if reason == "Callback returned HTTP 503"
        );
        assert_eq!(receiver.hits.load(Ordering::SeqCst), 3);

        let parked = store.load().await.unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].job_id, job_id);
        assert_eq!(parked[0].payload.final_result.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn unreachable_receiver_without_overflow() {
        let delivery = CallbackDelivery::new(&fast_config(0)).unwrap();
        let url = Url::parse("http://127.0.0.1:1/callback").unwrap();

        let outcome = delivery
            .deliver(new_job_id(), &url, &JobResult::failure("x"))
            .await;

        assert_matches!(
            outcome,
            DeliveryOutcome::Failed { attempts: 1, stored: false, .. }
        );
        assert!(!outcome.is_delivered());
    }

    #[tokio::test]
    async fn replay_redelivers_parked_results() {
        let (url, receiver) = spawn_receiver(0).await;
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileOverflowStore::new(dir.path().join("overflow.jsonl")));
        let job_id = new_job_id();
        store
            .store(&OverflowRecord::new(
                job_id,
                url.as_str(),
                JobResult::success("sunny, 20C", None),
                "connection refused",
                4,
            ))
            .await
            .unwrap();
        store
            .store(&OverflowRecord::new(
                new_job_id(),
                "not a url",
                JobResult::failure("x"),
                "connection refused",
                4,
            ))
            .await
            .unwrap();

        let delivery = CallbackDelivery::new(&fast_config(0))
            .unwrap()
            .with_overflow(store.clone());
        let summary = delivery.replay_parked(&store).await.unwrap();

        assert_eq!(
            summary,
            ReplaySummary { delivered: 1, failed: 0, discarded: 1 }
        );
        let received = receiver.received.lock().await;
        assert_eq!(received[0].0.as_deref(), Some(job_id.to_string().as_str()));
        assert_eq!(received[0].1, serde_json::json!({"final_result": "sunny, 20C"}));
        assert!(store.load().await.unwrap().is_empty());
        assert!(!store.replay_path().exists());
    }

    #[tokio::test]
    async fn replay_parks_results_that_fail_again() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileOverflowStore::new(dir.path().join("overflow.jsonl")));
        let job_id = new_job_id();
        store
            .store(&OverflowRecord::new(
                job_id,
                "http://127.0.0.1:1/callback",
                JobResult::failure("navigation timeout"),
                "connection refused",
                1,
            ))
            .await
            .unwrap();

        let delivery = CallbackDelivery::new(&fast_config(0))
            .unwrap()
            .with_overflow(store.clone());
        let summary = delivery.replay_parked(&store).await.unwrap();

        assert_eq!(summary.failed, 1);
        let parked = store.load().await.unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].job_id, job_id);
        assert!(!store.replay_path().exists());
    }

    #[test]
    fn fault_display_http_status() {
        assert_eq!(DeliveryFault::HttpStatus(502).to_string(), "Callback returned HTTP 502");
    }
}
