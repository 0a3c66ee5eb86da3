//! Job progress consumer: the declared handler for the job-progress topic.
//!
//! Translates progress events published by the engine's poll loop into
//! `transfer_jobs` snapshot updates. No automatic retry is performed on
//! failure; a handler error leaves the event pending on the stream.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;

use datalift_core::topics::{COMMON_GROUP, JOB_PROGRESS_TOPIC};
use datalift_db::repositories::JobRepo;
use datalift_hub::{BackendKind, BoxError, ConsumerRegistration, MessageHandler};

/// Payload shape published by the engine on every poll.
#[derive(Debug, Deserialize)]
struct ProgressPayload {
    job_id: String,
    read_records: i64,
    write_records: i64,
}

/// Writes progress snapshots to the job table.
pub struct JobProgressHandler {
    pool: PgPool,
}

impl JobProgressHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageHandler for JobProgressHandler {
    fn name(&self) -> &str {
        "job-progress-handler"
    }

    async fn handle(&self, payload: &str) -> Result<(), BoxError> {
        let progress: ProgressPayload = serde_json::from_str(payload)?;
        JobRepo::update_progress(
            &self.pool,
            &progress.job_id,
            progress.read_records,
            progress.write_records,
        )
        .await?;

        tracing::debug!(
            job_id = %progress.job_id,
            read_records = progress.read_records,
            write_records = progress.write_records,
            "Job progress recorded",
        );
        Ok(())
    }
}

/// Consumer registrations declared by this service, built once at boot.
pub fn declared_consumers(pool: &PgPool) -> Vec<ConsumerRegistration> {
    vec![ConsumerRegistration {
        topic: JOB_PROGRESS_TOPIC.to_string(),
        group: COMMON_GROUP.to_string(),
        backend: BackendKind::Stream,
        handler: Arc::new(JobProgressHandler::new(pool.clone())),
    }]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_parses_the_engine_shape() {
        let payload: ProgressPayload = serde_json::from_str(
            r#"{"job_id": "J1", "status": 1, "read_records": 100, "write_records": 96}"#,
        )
        .unwrap();
        assert_eq!(payload.job_id, "J1");
        assert_eq!(payload.read_records, 100);
        assert_eq!(payload.write_records, 96);
    }

    #[tokio::test]
    async fn declared_consumers_target_the_progress_topic() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let consumers = declared_consumers(&pool);

        assert_eq!(consumers.len(), 1);
        assert_eq!(consumers[0].topic, JOB_PROGRESS_TOPIC);
        assert_eq!(consumers[0].group, COMMON_GROUP);
        assert_eq!(consumers[0].backend, BackendKind::Stream);
    }
}
