//! Durable parking for results whose callback could not be delivered.
//!
//! Once retries are exhausted the callback attempt is the only record of a
//! job's outcome, so the payload is written here instead of being dropped.
//! Parked records are replayed at the next startup; see
//! [`CallbackDelivery::replay_parked`](super::callback::CallbackDelivery::replay_parked).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use webpilot_core::result::JobResult;
use webpilot_core::types::{JobId, Timestamp};

/// One undeliverable result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverflowRecord {
    pub job_id: JobId,
    pub callback_url: String,
    pub payload: JobResult,
    /// Last delivery fault.
    pub reason: String,
    pub attempts: u32,
    pub recorded_at: Timestamp,
}

impl OverflowRecord {
    pub fn new(
        job_id: JobId,
        callback_url: impl Into<String>,
        payload: JobResult,
        reason: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            job_id,
            callback_url: callback_url.into(),
            payload,
            reason: reason.into(),
            attempts,
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OverflowError {
    #[error("Overflow store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Overflow record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait OverflowStore: Send + Sync {
    async fn store(&self, record: &OverflowRecord) -> Result<(), OverflowError>;
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// Appends one JSON document per line to a file.
pub struct FileOverflowStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileOverflowStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Side file holding records taken out for replay.
    pub fn replay_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".replay");
        PathBuf::from(name)
    }

    /// Read back every parked record, oldest first. A missing file is empty.
    pub async fn load(&self) -> Result<Vec<OverflowRecord>, OverflowError> {
        let Some(contents) = read_optional(&self.path).await? else {
            return Ok(Vec::new());
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(OverflowError::from))
            .collect()
    }

    /// Move every parked record to the replay file and return its contents.
    ///
    /// Records stay on disk until [`finish_replay`](Self::finish_replay), so
    /// a replay interrupted by a crash is picked up again next time. New
    /// records parked meanwhile go to the main file. Unreadable lines are
    /// logged and skipped.
    pub async fn begin_replay(&self) -> Result<Vec<OverflowRecord>, OverflowError> {
        let replay_path = self.replay_path();
        {
            let _guard = self.write_lock.lock().await;
            if let Some(parked) = read_optional(&self.path).await? {
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&replay_path)
                    .await?;
                file.write_all(parked.as_bytes()).await?;
                file.flush().await?;
                tokio::fs::remove_file(&self.path).await?;
            }
        }

        let Some(contents) = read_optional(&replay_path).await? else {
            return Ok(Vec::new());
        };

        let records = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(
                        path = %replay_path.display(),
                        line = n + 1,
                        error = %e,
                        "Skipping unreadable overflow record",
                    );
                    None
                }
            })
            .collect();
        Ok(records)
    }

    /// Discard the replay file once its records have been handled.
    pub async fn finish_replay(&self) -> Result<(), OverflowError> {
        match tokio::fs::remove_file(self.replay_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>, OverflowError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl OverflowStore for FileOverflowStore {
    async fn store(&self, record: &OverflowRecord) -> Result<(), OverflowError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
