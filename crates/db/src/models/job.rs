//! Row types for the `transfer_jobs` table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// One data-transfer job: its descriptor, latest run state, and counters.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TransferJob {
    pub job_id: String,
    pub kind: String,
    /// The full serialized [`JobDescriptor`](datalift_core::job::JobDescriptor).
    pub descriptor: serde_json::Value,
    /// Parent job whose success cascades into this one.
    pub parent_job_id: Option<String>,
    pub status_id: i16,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub all_count: i64,
    pub append_count: i64,
    pub filter_count: i64,
    pub error_message: Option<String>,
    /// Task id assigned by the external transfer engine.
    pub task_id: Option<String>,
    /// Incremental sync cursor persisted after each run.
    pub cursor_value: Option<String>,
    /// Latest progress snapshot, updated by the progress consumer.
    pub read_records: i64,
    pub write_records: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
