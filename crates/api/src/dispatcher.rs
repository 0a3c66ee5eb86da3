//! Job dispatcher: action table, live-run table, cascade listener.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use datalift_core::job::{JobDescriptor, JobKind};
use datalift_engine::{run_job, JobRegistry, RunOutcome, TransferAction};

/// Errors surfaced when a dispatch request is rejected.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No transfer action is registered for the job kind.
    #[error("no transfer action registered for job kind \"{}\"", .0.as_str())]
    NoActionForKind(JobKind),

    /// A run for this job id is still alive.
    #[error("job \"{0}\" already has a live run")]
    AlreadyRunning(String),
}

struct RunHandle {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

/// Dispatches job descriptors onto lifecycle runs.
///
/// One long-lived instance owns the action table (job kind -> transfer
/// action) and the live-run table (job id -> cancel token + join handle).
pub struct JobDispatcher {
    actions: HashMap<JobKind, Arc<dyn TransferAction>>,
    runs: Mutex<HashMap<String, RunHandle>>,
    /// Parent of every run token; cancelled during shutdown.
    cancel: CancellationToken,
}

impl JobDispatcher {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
            runs: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Register the action handling a job kind.
    pub fn register_action(mut self, kind: JobKind, action: Arc<dyn TransferAction>) -> Self {
        self.actions.insert(kind, action);
        self
    }

    /// Spawn a lifecycle run for the descriptor.
    ///
    /// Returns synchronously once the run is dispatched; the run itself
    /// completes asynchronously. A job id with a live run is rejected.
    pub fn dispatch(&self, descriptor: JobDescriptor) -> Result<(), DispatchError> {
        let action = self
            .actions
            .get(&descriptor.kind)
            .cloned()
            .ok_or(DispatchError::NoActionForKind(descriptor.kind))?;

        let mut runs = self.runs.lock().expect("run table poisoned");
        if let Some(existing) = runs.get(&descriptor.job_id) {
            if !existing.handle.is_finished() {
                return Err(DispatchError::AlreadyRunning(descriptor.job_id));
            }
            runs.remove(&descriptor.job_id);
        }

        let job_id = descriptor.job_id.clone();
        let cancel = self.cancel.child_token();
        let run_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            match run_job(action, &descriptor, run_cancel).await {
                RunOutcome::Success(metrics) => {
                    tracing::info!(
                        job_id = %descriptor.job_id,
                        read_records = metrics.read_records,
                        write_records = metrics.write_records,
                        "Job run succeeded",
                    );
                }
                RunOutcome::Failed { message, .. } => {
                    tracing::error!(job_id = %descriptor.job_id, %message, "Job run failed");
                }
                RunOutcome::Stopped => {
                    tracing::info!(job_id = %descriptor.job_id, "Job run stopped by request");
                }
            }
        });

        tracing::info!(job_id = %job_id, "Job dispatched");
        runs.insert(job_id, RunHandle { cancel, handle });
        Ok(())
    }

    /// Whether a monitor/handler task for the job id is currently alive.
    pub fn is_alive(&self, job_id: &str) -> bool {
        let runs = self.runs.lock().expect("run table poisoned");
        runs.get(job_id)
            .map(|run| !run.handle.is_finished())
            .unwrap_or(false)
    }

    /// Request a cooperative stop for a job's live run.
    ///
    /// Returns `false` when no run is known for the id. The flag is only
    /// observed at the pre-submission checkpoint; a run already past
    /// submission finishes its current transfer.
    pub fn request_stop(&self, job_id: &str) -> bool {
        let runs = self.runs.lock().expect("run table poisoned");
        match runs.get(job_id) {
            Some(run) => {
                run.cancel.cancel();
                tracing::info!(job_id, "Cooperative stop requested");
                true
            }
            None => false,
        }
    }

    /// Receive cascaded job ids, load their descriptors, and re-dispatch.
    pub async fn run_cascade_listener(
        self: Arc<Self>,
        registry: Arc<dyn JobRegistry>,
        mut rx: mpsc::UnboundedReceiver<String>,
        cancel: CancellationToken,
    ) {
        tracing::info!("Cascade listener started");
        loop {
            let job_id = tokio::select! {
                _ = cancel.cancelled() => break,
                job_id = rx.recv() => match job_id {
                    Some(job_id) => job_id,
                    None => break,
                },
            };

            let descriptor = match registry.get_descriptor(&job_id).await {
                Ok(Some(descriptor)) => descriptor,
                Ok(None) => {
                    tracing::warn!(job_id = %job_id, "Cascaded job has no descriptor");
                    continue;
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Cascade descriptor load failed");
                    continue;
                }
            };

            tracing::info!(job_id = %job_id, "Dispatching cascaded job");
            if let Err(e) = self.dispatch(descriptor) {
                tracing::error!(job_id = %job_id, error = %e, "Cascaded dispatch rejected");
            }
        }
        tracing::info!("Cascade listener stopped");
    }

    /// Cancel every run token and wait (bounded) for live runs to settle.
    ///
    /// Runs past their cancellation checkpoint keep polling; anything
    /// still alive after the wait is aborted.
    pub async fn shutdown(&self, wait: Duration) {
        self.cancel.cancel();

        let mut handles: Vec<tokio::task::JoinHandle<()>> = {
            let mut runs = self.runs.lock().expect("run table poisoned");
            runs.drain().map(|(_, run)| run.handle).collect()
        };
        if handles.is_empty() {
            return;
        }

        tracing::info!(runs = handles.len(), "Waiting for live job runs");
        let joined = futures::future::join_all(handles.iter_mut());
        if tokio::time::timeout(wait, joined).await.is_err() {
            tracing::warn!("Job runs did not settle in time; aborting");
            for handle in &handles {
                handle.abort();
            }
        }
    }
}

impl Default for JobDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use datalift_core::job::{JobStatus, SyncUnit, TransferEndpoint};
    use datalift_engine::lifecycle::RunContext;
    use datalift_engine::{EngineError, ExecutionUnit};

    use super::*;

    /// Action that reports running for `polls_until_done` polls, then done.
    struct StubAction {
        polls: AtomicUsize,
        polls_until_done: usize,
    }

    #[async_trait]
    impl TransferAction for StubAction {
        async fn begin(
            &self,
            _ctx: &RunContext,
            _descriptor: &JobDescriptor,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        fn convert(&self, descriptor: &JobDescriptor) -> ExecutionUnit {
            ExecutionUnit::from_descriptor(descriptor)
        }

        async fn before_exec(
            &self,
            _ctx: &RunContext,
            _unit: &mut ExecutionUnit,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        async fn execute(
            &self,
            _ctx: &RunContext,
            unit: &mut ExecutionUnit,
        ) -> Result<(), EngineError> {
            unit.task_id = Some("stub-task".to_string());
            Ok(())
        }

        async fn check_result(
            &self,
            _ctx: &RunContext,
            _unit: &mut ExecutionUnit,
        ) -> Result<bool, EngineError> {
            Ok(self.polls.fetch_add(1, Ordering::SeqCst) + 1 >= self.polls_until_done)
        }

        async fn after_exec(&self, _ctx: &RunContext, _unit: &mut ExecutionUnit, _success: bool) {}

        async fn end(&self, _ctx: &RunContext, _job_id: &str, _status: JobStatus, _message: &str) {
        }

        fn poll_interval(&self) -> Duration {
            Duration::from_millis(5)
        }
    }

    fn descriptor(job_id: &str) -> JobDescriptor {
        let endpoint = |connect_id: &str| TransferEndpoint {
            connect_id: connect_id.to_string(),
            schema: "public".to_string(),
            table: "t".to_string(),
            cursor_column: None,
        };
        JobDescriptor {
            job_id: job_id.to_string(),
            kind: JobKind::Batch,
            sync_unit: SyncUnit {
                reader: endpoint("mockdb://src/db"),
                writer: endpoint("mockdb://dst/db"),
            },
            overwrite: false,
        }
    }

    fn dispatcher_with_stub(polls_until_done: usize) -> JobDispatcher {
        JobDispatcher::new().register_action(
            JobKind::Batch,
            Arc::new(StubAction {
                polls: AtomicUsize::new(0),
                polls_until_done,
            }),
        )
    }

    #[tokio::test]
    async fn unregistered_kind_is_rejected() {
        let dispatcher = JobDispatcher::new();
        let result = dispatcher.dispatch(descriptor("j1"));
        assert!(matches!(result, Err(DispatchError::NoActionForKind(_))));
        assert!(!dispatcher.is_alive("j1"));
    }

    #[tokio::test]
    async fn duplicate_live_run_is_rejected_until_the_first_finishes() {
        let dispatcher = dispatcher_with_stub(10);

        dispatcher.dispatch(descriptor("j1")).unwrap();
        assert!(dispatcher.is_alive("j1"));
        assert!(matches!(
            dispatcher.dispatch(descriptor("j1")),
            Err(DispatchError::AlreadyRunning(_))
        ));

        // Wait for the run to complete, then re-dispatch succeeds.
        for _ in 0..100 {
            if !dispatcher.is_alive("j1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!dispatcher.is_alive("j1"));
        dispatcher.dispatch(descriptor("j1")).unwrap();
    }

    #[tokio::test]
    async fn stop_for_an_unknown_job_returns_false() {
        let dispatcher = dispatcher_with_stub(1);
        assert!(!dispatcher.request_stop("nope"));
    }

    #[tokio::test]
    async fn stop_for_a_known_run_sets_the_flag() {
        let dispatcher = dispatcher_with_stub(50);
        dispatcher.dispatch(descriptor("j1")).unwrap();
        assert!(dispatcher.request_stop("j1"));
    }
}
