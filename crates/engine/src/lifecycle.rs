//! Lifecycle template: the fixed step order every transfer action runs in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use datalift_core::job::{JobDescriptor, JobStatus};
use datalift_core::metrics::{sum_counts, ExecCount, TransferMetrics};

use crate::error::EngineError;
use crate::unit::ExecutionUnit;

/// Message reported when a run ends via cooperative stop.
const CANCEL_MESSAGE: &str = "cancel the job";

/// Default pause between result polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Per-run, per-table count aggregate.
///
/// One instance per run, shared by reference between the caller and that
/// run's monitor task — never across runs. The monitor task writes it in
/// `after_exec`; the caller reads it in `end` after joining the monitor,
/// so the join is the only synchronization edge the totals need.
#[derive(Default)]
pub struct ExecCounts {
    inner: Mutex<HashMap<String, ExecCount>>,
}

impl ExecCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate the accumulator for a table, creating it on first use.
    pub fn record(&self, table: &str, f: impl FnOnce(&mut ExecCount)) {
        let mut inner = self.inner.lock().expect("exec counts poisoned");
        f(inner.entry(table.to_string()).or_default());
    }

    /// Sum all per-table entries into one totals record.
    pub fn totals(&self) -> ExecCount {
        let inner = self.inner.lock().expect("exec counts poisoned");
        sum_counts(inner.values())
    }
}

/// Shared per-run state passed into every hook.
#[derive(Clone)]
pub struct RunContext {
    pub job_id: String,
    pub start_time: DateTime<Utc>,
    pub counts: Arc<ExecCounts>,
    /// Cooperative stop signal, checked once before submission.
    pub cancel: CancellationToken,
}

/// How one run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Success(TransferMetrics),
    Failed {
        message: String,
        metrics: TransferMetrics,
    },
    Stopped,
}

/// The overridable lifecycle hooks. [`run_job`] fixes their order.
#[async_trait]
pub trait TransferAction: Send + Sync {
    /// Report the run as created upstream with zeroed counters.
    async fn begin(&self, ctx: &RunContext, descriptor: &JobDescriptor)
        -> Result<(), EngineError>;

    /// Derive the execution unit from the descriptor.
    fn convert(&self, descriptor: &JobDescriptor) -> ExecutionUnit;

    /// Resolve drivers and run pre-submission work (truncate on overwrite).
    async fn before_exec(
        &self,
        ctx: &RunContext,
        unit: &mut ExecutionUnit,
    ) -> Result<(), EngineError>;

    /// Submit to the external engine. Must be idempotent per unit: a unit
    /// that already carries a task id is not submitted again.
    async fn execute(&self, ctx: &RunContext, unit: &mut ExecutionUnit)
        -> Result<(), EngineError>;

    /// One poll: returns `Ok(true)` when the task finished, `Ok(false)`
    /// while it is still running (after refreshing progress metrics), and
    /// `Err` when the task failed, was canceled, or the poll itself failed.
    async fn check_result(
        &self,
        ctx: &RunContext,
        unit: &mut ExecutionUnit,
    ) -> Result<bool, EngineError>;

    /// Post-run bookkeeping: persist the cursor regardless of outcome; on
    /// success, merge the unit's counts into the run aggregate. Failures
    /// here are logged by the implementation, never propagated.
    async fn after_exec(&self, ctx: &RunContext, unit: &mut ExecutionUnit, success: bool);

    /// Report the terminal status with summed totals; cascade on success.
    async fn end(&self, ctx: &RunContext, job_id: &str, status: JobStatus, message: &str);

    /// Pause between polls. Overridable so tests run at millisecond speed.
    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }
}

/// Drive one job run through the lifecycle.
///
/// Total: every exit path reports exactly one terminal status through
/// `end` and returns the matching outcome. The caller observes the run
/// synchronously — polling happens on a spawned monitor task, but this
/// function joins it before finalizing.
pub async fn run_job(
    action: Arc<dyn TransferAction>,
    descriptor: &JobDescriptor,
    cancel: CancellationToken,
) -> RunOutcome {
    let ctx = RunContext {
        job_id: descriptor.job_id.clone(),
        start_time: Utc::now(),
        counts: Arc::new(ExecCounts::new()),
        cancel,
    };

    let mut unit = action.convert(descriptor);

    if let Err(e) = action.begin(&ctx, descriptor).await {
        tracing::error!(job_id = %ctx.job_id, error = %e, "Job begin failed");
        let message = e.to_string();
        action.end(&ctx, &ctx.job_id, JobStatus::Error, &message).await;
        return RunOutcome::Failed {
            message,
            metrics: unit.metrics.clone(),
        };
    }

    // Cooperative stop: the only checkpoint is here, before submission.
    // A stop requested later is not observed until the next run.
    if ctx.cancel.is_cancelled() {
        tracing::info!(job_id = %ctx.job_id, "Stop requested before submission");
        action
            .end(&ctx, &ctx.job_id, JobStatus::Stopped, CANCEL_MESSAGE)
            .await;
        return RunOutcome::Stopped;
    }

    let prepared = async {
        action.before_exec(&ctx, &mut unit).await?;
        action.execute(&ctx, &mut unit).await?;
        Ok::<(), EngineError>(())
    }
    .await;

    if let Err(e) = prepared {
        // Short-circuit: the monitor task is never started.
        tracing::error!(job_id = %ctx.job_id, error = %e, "Job preparation failed");
        action.after_exec(&ctx, &mut unit, false).await;
        let message = e.to_string();
        action.end(&ctx, &ctx.job_id, JobStatus::Error, &message).await;
        return RunOutcome::Failed {
            message,
            metrics: unit.metrics.clone(),
        };
    }

    // Monitor task: owns the unit for the duration of the poll loop and
    // returns it through the join handle.
    let monitor_action = Arc::clone(&action);
    let monitor_ctx = ctx.clone();
    let monitor = tokio::spawn(async move {
        let mut unit = unit;
        let mut poll = tokio::time::interval(monitor_action.poll_interval());
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let verdict = loop {
            poll.tick().await;
            match monitor_action.check_result(&monitor_ctx, &mut unit).await {
                Ok(true) => {
                    monitor_action.after_exec(&monitor_ctx, &mut unit, true).await;
                    break Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    // Exception-terminating: the loop never retries a
                    // failed poll.
                    tracing::error!(
                        job_id = %monitor_ctx.job_id,
                        error = %e,
                        "Transfer monitoring failed",
                    );
                    monitor_action.after_exec(&monitor_ctx, &mut unit, false).await;
                    break Err(e);
                }
            }
        };
        (unit, verdict)
    });

    // Join establishes the happens-before edge between the monitor's
    // aggregate writes and the totals read in `end`.
    match monitor.await {
        Ok((unit, Ok(()))) => {
            action.end(&ctx, &ctx.job_id, JobStatus::Success, "success").await;
            RunOutcome::Success(unit.metrics.clone())
        }
        Ok((unit, Err(e))) => {
            let message = e.to_string();
            action.end(&ctx, &ctx.job_id, JobStatus::Error, &message).await;
            RunOutcome::Failed {
                message,
                metrics: unit.metrics.clone(),
            }
        }
        Err(join_error) => {
            let message = if join_error.is_panic() {
                "transfer monitor panicked".to_string()
            } else {
                "transfer monitor aborted".to_string()
            };
            tracing::error!(job_id = %ctx.job_id, error = %join_error, "Monitor task lost");
            action.end(&ctx, &ctx.job_id, JobStatus::Error, &message).await;
            RunOutcome::Failed {
                message,
                metrics: TransferMetrics::default(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_every_table() {
        let counts = ExecCounts::new();
        counts.record("a", |c| c.append_count += 10);
        counts.record("b", |c| c.append_count += 5);
        counts.record("a", |c| c.filter_count += 3);

        let totals = counts.totals();
        assert_eq!(totals.append_count, 15);
        assert_eq!(totals.filter_count, 3);
    }

    #[test]
    fn record_creates_the_accumulator_on_first_use() {
        let counts = ExecCounts::new();
        counts.record("fresh", |c| c.all_count = 7);
        assert_eq!(counts.totals().all_count, 7);
    }
}
