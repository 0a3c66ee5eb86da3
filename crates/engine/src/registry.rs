//! Job registry adapter: the upstream system of record for job state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use datalift_core::job::{JobDescriptor, JobStatus};
use datalift_core::metrics::ExecCount;

use crate::error::EngineError;

/// One status report: lifecycle status plus time range and summed counts.
#[derive(Debug, Clone)]
pub struct JobStateUpdate {
    pub job_id: String,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub counts: ExecCount,
    pub error_message: Option<String>,
}

/// The contract the lifecycle requires from the job system of record.
///
/// The production implementation persists to PostgreSQL and feeds the
/// dispatcher's cascade channel; tests substitute recording mocks.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Report a status transition.
    async fn update_status(&self, update: &JobStateUpdate) -> Result<(), EngineError>;

    /// Record the external task id assigned to a job run.
    async fn update_task_relation(&self, job_id: &str, task_id: &str) -> Result<(), EngineError>;

    /// Persist the incremental sync cursor for the next run.
    async fn update_sync_cursor(
        &self,
        job_id: &str,
        cursor_value: Option<&str>,
    ) -> Result<(), EngineError>;

    /// Notify that dependents chained to this job may now run.
    async fn cascade(&self, job_id: &str) -> Result<(), EngineError>;

    /// Load the descriptor for a job id, if known.
    async fn get_descriptor(&self, job_id: &str) -> Result<Option<JobDescriptor>, EngineError>;
}
