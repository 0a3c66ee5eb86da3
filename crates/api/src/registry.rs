//! PostgreSQL-backed job registry.
//!
//! Implements the engine's [`JobRegistry`] seam over [`JobRepo`] and
//! feeds cascaded job ids to the dispatcher's cascade channel.

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::mpsc;

use datalift_core::job::JobDescriptor;
use datalift_db::repositories::JobRepo;
use datalift_engine::{EngineError, JobRegistry, JobStateUpdate};

/// Job registry persisting to the `transfer_jobs` table.
pub struct PgJobRegistry {
    pool: PgPool,
    cascade_tx: mpsc::UnboundedSender<String>,
}

impl PgJobRegistry {
    pub fn new(pool: PgPool, cascade_tx: mpsc::UnboundedSender<String>) -> Self {
        Self { pool, cascade_tx }
    }
}

fn registry_error(e: sqlx::Error) -> EngineError {
    EngineError::Registry(e.to_string())
}

#[async_trait]
impl JobRegistry for PgJobRegistry {
    async fn update_status(&self, update: &JobStateUpdate) -> Result<(), EngineError> {
        JobRepo::update_status(
            &self.pool,
            &update.job_id,
            update.status.id(),
            update.start_time,
            update.end_time,
            &update.counts,
            update.error_message.as_deref(),
        )
        .await
        .map_err(registry_error)
    }

    async fn update_task_relation(&self, job_id: &str, task_id: &str) -> Result<(), EngineError> {
        JobRepo::update_task_relation(&self.pool, job_id, task_id)
            .await
            .map_err(registry_error)
    }

    async fn update_sync_cursor(
        &self,
        job_id: &str,
        cursor_value: Option<&str>,
    ) -> Result<(), EngineError> {
        JobRepo::update_sync_cursor(&self.pool, job_id, cursor_value)
            .await
            .map_err(registry_error)
    }

    async fn cascade(&self, job_id: &str) -> Result<(), EngineError> {
        let dependents = JobRepo::find_dependents(&self.pool, job_id)
            .await
            .map_err(registry_error)?;

        for dependent in dependents {
            tracing::info!(parent = job_id, job_id = %dependent, "Cascading dependent job");
            // Fire-and-forget: a closed channel means the dispatcher is
            // shutting down, which is not this run's failure.
            if self.cascade_tx.send(dependent.clone()).is_err() {
                tracing::warn!(job_id = %dependent, "Cascade channel closed; dependent skipped");
            }
        }
        Ok(())
    }

    async fn get_descriptor(&self, job_id: &str) -> Result<Option<JobDescriptor>, EngineError> {
        JobRepo::get_descriptor(&self.pool, job_id)
            .await
            .map_err(registry_error)
    }
}
