//! Batch transfer action: the lifecycle hooks for table-to-table jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use datalift_core::job::{JobDescriptor, JobStatus};
use datalift_core::metrics::ExecCount;
use datalift_core::topics::{COMMON_GROUP, JOB_PROGRESS_TOPIC};
use datalift_driver::DriverRegistry;
use datalift_hub::{BackendKind, MessageEnvelope, MessageHub};

use crate::error::EngineError;
use crate::lifecycle::{RunContext, TransferAction};
use crate::registry::{JobRegistry, JobStateUpdate};
use crate::remote::{ExecutionEngine, TaskState, TaskStatus, COUNTER_ERRORS, COUNTER_READ, COUNTER_WRITE};
use crate::unit::ExecutionUnit;

/// Fallback message when a failed task reports no exceptions.
const TASK_FAILED_MESSAGE: &str = "data-transfer task failed.";

/// Message for a task the engine reports as canceled.
const TASK_CANCELED_MESSAGE: &str = "data-transfer task canceled.";

/// Batch transfer: resolve drivers, submit reader/writer specs to the
/// external engine, poll to completion, publish progress on every poll.
pub struct BatchTransferAction {
    drivers: Arc<DriverRegistry>,
    engine: Arc<dyn ExecutionEngine>,
    registry: Arc<dyn JobRegistry>,
    hub: Arc<MessageHub>,
    poll_interval: Duration,
}

impl BatchTransferAction {
    pub fn new(
        drivers: Arc<DriverRegistry>,
        engine: Arc<dyn ExecutionEngine>,
        registry: Arc<dyn JobRegistry>,
        hub: Arc<MessageHub>,
    ) -> Self {
        Self {
            drivers,
            engine,
            registry,
            hub,
            poll_interval: Duration::from_secs(5),
        }
    }

    /// Override the poll pause. Tests run the lifecycle at millisecond speed.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Refresh the unit's metrics from the engine counters and publish a
    /// progress event. Runs on every poll, not only at completion.
    async fn compute_records(&self, unit: &mut ExecutionUnit, status: &TaskStatus) {
        let read = status.counter(COUNTER_READ);
        let write = status.counter(COUNTER_WRITE);
        let errors = status.counter(COUNTER_ERRORS);

        unit.metrics.read_records = read;
        unit.metrics.error_records = errors;
        // Effective writes: raw writes minus error records.
        unit.metrics.write_records = (write - errors).max(0);

        let payload = json!({
            "job_id": unit.job_id,
            "status": 1,
            "read_records": unit.metrics.read_records,
            "write_records": unit.metrics.write_records,
        });
        let envelope = MessageEnvelope {
            topic: JOB_PROGRESS_TOPIC.to_string(),
            group: COMMON_GROUP.to_string(),
            backend: BackendKind::Stream,
            payload: payload.to_string(),
        };
        // A progress publish failure never fails the poll.
        if let Err(e) = self.hub.produce(&envelope).await {
            tracing::warn!(job_id = %unit.job_id, error = %e, "Progress publish failed");
        }
    }
}

#[async_trait]
impl TransferAction for BatchTransferAction {
    async fn begin(
        &self,
        ctx: &RunContext,
        descriptor: &JobDescriptor,
    ) -> Result<(), EngineError> {
        tracing::info!(job_id = %descriptor.job_id, "Starting data transfer");
        self.registry
            .update_status(&JobStateUpdate {
                job_id: descriptor.job_id.clone(),
                status: JobStatus::Created,
                start_time: ctx.start_time,
                end_time: None,
                counts: ExecCount::default(),
                error_message: None,
            })
            .await
    }

    fn convert(&self, descriptor: &JobDescriptor) -> ExecutionUnit {
        ExecutionUnit::from_descriptor(descriptor)
    }

    async fn before_exec(
        &self,
        _ctx: &RunContext,
        unit: &mut ExecutionUnit,
    ) -> Result<(), EngineError> {
        tracing::info!(
            job_id = %unit.job_id,
            reader_table = %unit.reader.table,
            writer_table = %unit.writer.table,
            "Resolving transfer drivers",
        );

        let reader = self.drivers.resolve_reader(&unit.reader.connect_id)?;
        let writer = self.drivers.resolve_writer(&unit.writer.connect_id)?;

        if unit.overwrite {
            writer.truncate(&unit.writer).await?;
        }

        unit.reader_driver = Some(reader);
        unit.writer_driver = Some(writer);
        Ok(())
    }

    async fn execute(
        &self,
        _ctx: &RunContext,
        unit: &mut ExecutionUnit,
    ) -> Result<(), EngineError> {
        // Idempotent per unit: a resumed run with a task id skips submission.
        if unit.task_id.is_some() {
            tracing::debug!(job_id = %unit.job_id, "Task already submitted; skipping");
            return Ok(());
        }

        let reader_driver = unit
            .reader_driver
            .as_ref()
            .ok_or_else(|| EngineError::Submission("reader driver not resolved".to_string()))?;
        let writer_driver = unit
            .writer_driver
            .as_ref()
            .ok_or_else(|| EngineError::Submission("writer driver not resolved".to_string()))?;

        // Capture the incremental high-water mark before any data moves.
        if unit.reader.cursor_column.is_some() {
            unit.metrics.cursor_value = reader_driver.max_cursor_value(&unit.reader).await?;
        }

        let reader_spec = reader_driver.reader_spec(&unit.reader);
        let writer_spec = writer_driver.writer_spec(&unit.writer);

        let task_id = self
            .engine
            .submit(&unit.job_id, &reader_spec, &writer_spec, &json!({}))
            .await?;

        tracing::info!(job_id = %unit.job_id, task_id = %task_id, "Transfer submitted");
        unit.task_id = Some(task_id.clone());
        self.registry
            .update_task_relation(&unit.job_id, &task_id)
            .await?;
        Ok(())
    }

    async fn check_result(
        &self,
        _ctx: &RunContext,
        unit: &mut ExecutionUnit,
    ) -> Result<bool, EngineError> {
        let task_id = unit
            .task_id
            .clone()
            .ok_or_else(|| EngineError::Poll("task id is empty.".to_string()))?;

        let status = self.engine.status(&task_id).await?;

        match &status.state {
            TaskState::Finished => {
                self.compute_records(unit, &status).await;
                Ok(true)
            }
            TaskState::Failed => {
                let exceptions = self.engine.exceptions(&task_id).await?;
                let message = exceptions
                    .first()
                    .cloned()
                    .unwrap_or_else(|| TASK_FAILED_MESSAGE.to_string());
                tracing::error!(job_id = %unit.job_id, task_id = %task_id, %message, "Transfer failed");
                Err(EngineError::Poll(message))
            }
            TaskState::Canceled => {
                tracing::error!(job_id = %unit.job_id, task_id = %task_id, "Transfer canceled");
                Err(EngineError::Poll(TASK_CANCELED_MESSAGE.to_string()))
            }
            TaskState::Running(_) => {
                self.compute_records(unit, &status).await;
                Ok(false)
            }
        }
    }

    async fn after_exec(&self, ctx: &RunContext, unit: &mut ExecutionUnit, success: bool) {
        // Persist the cursor regardless of outcome so the next run resumes
        // from the captured high-water mark.
        if let Err(e) = self
            .registry
            .update_sync_cursor(&unit.job_id, unit.metrics.cursor_value.as_deref())
            .await
        {
            tracing::error!(job_id = %unit.job_id, error = %e, "Failed to persist sync cursor");
        }

        if success {
            tracing::info!(
                job_id = %unit.job_id,
                read_records = unit.metrics.read_records,
                write_records = unit.metrics.write_records,
                "Transfer unit finished",
            );
            let read = unit.metrics.read_records;
            let write = unit.metrics.write_records;
            ctx.counts.record(&unit.reader.table, |count| {
                count.append_count += read;
                count.filter_count += write;
            });
        }
    }

    async fn end(&self, ctx: &RunContext, job_id: &str, status: JobStatus, message: &str) {
        let totals = ctx.counts.totals();
        tracing::info!(job_id, status = ?status, "Transfer run ended");

        let update = JobStateUpdate {
            job_id: job_id.to_string(),
            status,
            start_time: ctx.start_time,
            end_time: Some(chrono::Utc::now()),
            counts: totals,
            error_message: (status != JobStatus::Success).then(|| message.to_string()),
        };
        if let Err(e) = self.registry.update_status(&update).await {
            tracing::error!(job_id, error = %e, "Failed to report terminal status");
        }

        // Dependent jobs run iff this run succeeded.
        if status == JobStatus::Success {
            if let Err(e) = self.registry.cascade(job_id).await {
                tracing::error!(job_id, error = %e, "Cascade notification failed");
            }
        }
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
