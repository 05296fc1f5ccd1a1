/// Jobs are keyed by a time-ordered UUID assigned at acceptance.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Allocate a fresh job identifier.
pub fn new_job_id() -> JobId {
    uuid::Uuid::now_v7()
}
