//! Repository for the `transfer_jobs` table.
//!
//! Uses `JobStatus` from `datalift_core` for all status transitions.
//! No magic numbers — every status literal is a named constant.

use sqlx::PgPool;

use datalift_core::job::{JobDescriptor, JobStatus, StatusId};
use datalift_core::metrics::ExecCount;

use crate::models::job::TransferJob;

/// Column list for `transfer_jobs` queries.
const COLUMNS: &str = "\
    job_id, kind, descriptor, parent_job_id, status_id, \
    start_time, end_time, all_count, append_count, filter_count, \
    error_message, task_id, cursor_value, read_records, write_records, \
    created_at, updated_at";

/// Provides persistence for transfer jobs and their run state.
pub struct JobRepo;

impl JobRepo {
    /// Insert or replace a job's descriptor.
    ///
    /// A re-submitted job keeps its run history columns; only the
    /// descriptor, kind, and parent linkage are replaced.
    pub async fn upsert_descriptor(
        pool: &PgPool,
        descriptor: &JobDescriptor,
        parent_job_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let descriptor_json =
            serde_json::to_value(descriptor).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        sqlx::query(
            "INSERT INTO transfer_jobs (job_id, kind, descriptor, parent_job_id, status_id) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (job_id) DO UPDATE \
             SET kind = EXCLUDED.kind, \
                 descriptor = EXCLUDED.descriptor, \
                 parent_job_id = EXCLUDED.parent_job_id, \
                 updated_at = NOW()",
        )
        .bind(&descriptor.job_id)
        .bind(descriptor.kind.as_str())
        .bind(descriptor_json)
        .bind(parent_job_id)
        .bind(JobStatus::Created.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Load a job's descriptor, if the job exists.
    pub async fn get_descriptor(
        pool: &PgPool,
        job_id: &str,
    ) -> Result<Option<JobDescriptor>, sqlx::Error> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT descriptor FROM transfer_jobs WHERE job_id = $1")
                .bind(job_id)
                .fetch_optional(pool)
                .await?;

        match row {
            Some((value,)) => {
                let descriptor =
                    serde_json::from_value(value).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
                Ok(Some(descriptor))
            }
            None => Ok(None),
        }
    }

    /// Find a job row by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        job_id: &str,
    ) -> Result<Option<TransferJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM transfer_jobs WHERE job_id = $1");
        sqlx::query_as::<_, TransferJob>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Record a status transition with its time range, summed counters,
    /// and optional error message.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_status(
        pool: &PgPool,
        job_id: &str,
        status_id: StatusId,
        start_time: chrono::DateTime<chrono::Utc>,
        end_time: Option<chrono::DateTime<chrono::Utc>>,
        counts: &ExecCount,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE transfer_jobs \
             SET status_id = $2, start_time = $3, end_time = $4, \
                 all_count = $5, append_count = $6, filter_count = $7, \
                 error_message = $8, updated_at = NOW() \
             WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(status_id)
        .bind(start_time)
        .bind(end_time)
        .bind(counts.all_count)
        .bind(counts.append_count)
        .bind(counts.filter_count)
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record the external engine task id assigned to a job run.
    pub async fn update_task_relation(
        pool: &PgPool,
        job_id: &str,
        task_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE transfer_jobs SET task_id = $2, updated_at = NOW() WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(task_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Persist the incremental sync cursor for a job.
    pub async fn update_sync_cursor(
        pool: &PgPool,
        job_id: &str,
        cursor_value: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE transfer_jobs SET cursor_value = $2, updated_at = NOW() WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(cursor_value)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Update the latest read/write progress snapshot.
    pub async fn update_progress(
        pool: &PgPool,
        job_id: &str,
        read_records: i64,
        write_records: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE transfer_jobs \
             SET read_records = $2, write_records = $3, updated_at = NOW() \
             WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(read_records)
        .bind(write_records)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Job ids chained to the given parent, candidates for cascade.
    pub async fn find_dependents(
        pool: &PgPool,
        job_id: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT job_id FROM transfer_jobs WHERE parent_job_id = $1 ORDER BY job_id",
        )
        .bind(job_id)
        .fetch_all(pool)
        .await
    }
}
