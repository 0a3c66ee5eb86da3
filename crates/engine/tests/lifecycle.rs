//! Lifecycle behavior with mocked collaborators: the engine, the job
//! registry, and the drivers are all scripted so runs complete in
//! milliseconds.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use datalift_core::job::{JobDescriptor, JobKind, JobStatus, SyncUnit, TransferEndpoint};
use datalift_core::topics::JOB_PROGRESS_TOPIC;
use datalift_driver::capability::TableInfo;
use datalift_driver::{DriverError, DriverRegistry, DriverSet, DsDriver, DsReader, DsWriter};
use datalift_engine::lifecycle::{ExecCounts, RunContext};
use datalift_engine::remote::{TaskCounter, TaskState, TaskStatus};
use datalift_engine::{
    run_job, BatchTransferAction, EngineError, ExecutionEngine, ExecutionUnit, JobRegistry,
    JobStateUpdate, RunOutcome, TransferAction,
};
use datalift_hub::{MessageHub, TopicWhitelist};

// ---------------------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------------------

struct MockEngine {
    submissions: Mutex<Vec<String>>,
    statuses: Mutex<VecDeque<TaskStatus>>,
    exceptions: Vec<String>,
}

impl MockEngine {
    fn scripted(statuses: Vec<TaskStatus>, exceptions: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            submissions: Mutex::new(Vec::new()),
            statuses: Mutex::new(statuses.into()),
            exceptions,
        })
    }

    fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutionEngine for MockEngine {
    async fn submit(
        &self,
        job_id: &str,
        _reader_spec: &serde_json::Value,
        _writer_spec: &serde_json::Value,
        _options: &serde_json::Value,
    ) -> Result<String, EngineError> {
        self.submissions.lock().unwrap().push(job_id.to_string());
        Ok("T1".to_string())
    }

    async fn status(&self, _task_id: &str) -> Result<TaskStatus, EngineError> {
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| EngineError::Poll("status script exhausted".to_string()))
    }

    async fn exceptions(&self, _task_id: &str) -> Result<Vec<String>, EngineError> {
        Ok(self.exceptions.clone())
    }
}

fn running() -> TaskStatus {
    TaskStatus {
        state: TaskState::Running("running".to_string()),
        counters: vec![],
    }
}

fn finished(read: i64, write: i64, errors: i64) -> TaskStatus {
    TaskStatus {
        state: TaskState::Finished,
        counters: vec![
            TaskCounter {
                name: "numRead".to_string(),
                value: read,
            },
            TaskCounter {
                name: "numWrite".to_string(),
                value: write,
            },
            TaskCounter {
                name: "nErrors".to_string(),
                value: errors,
            },
        ],
    }
}

fn failed() -> TaskStatus {
    TaskStatus {
        state: TaskState::Failed,
        counters: vec![],
    }
}

#[derive(Default)]
struct MockRegistry {
    statuses: Mutex<Vec<JobStateUpdate>>,
    task_relations: Mutex<Vec<(String, String)>>,
    cursors: Mutex<Vec<(String, Option<String>)>>,
    cascades: Mutex<Vec<String>>,
}

impl MockRegistry {
    fn reported_statuses(&self) -> Vec<JobStatus> {
        self.statuses.lock().unwrap().iter().map(|u| u.status).collect()
    }
}

#[async_trait]
impl JobRegistry for MockRegistry {
    async fn update_status(&self, update: &JobStateUpdate) -> Result<(), EngineError> {
        self.statuses.lock().unwrap().push(update.clone());
        Ok(())
    }

    async fn update_task_relation(&self, job_id: &str, task_id: &str) -> Result<(), EngineError> {
        self.task_relations
            .lock()
            .unwrap()
            .push((job_id.to_string(), task_id.to_string()));
        Ok(())
    }

    async fn update_sync_cursor(
        &self,
        job_id: &str,
        cursor_value: Option<&str>,
    ) -> Result<(), EngineError> {
        self.cursors
            .lock()
            .unwrap()
            .push((job_id.to_string(), cursor_value.map(str::to_string)));
        Ok(())
    }

    async fn cascade(&self, job_id: &str) -> Result<(), EngineError> {
        self.cascades.lock().unwrap().push(job_id.to_string());
        Ok(())
    }

    async fn get_descriptor(&self, _job_id: &str) -> Result<Option<JobDescriptor>, EngineError> {
        Ok(None)
    }
}

#[derive(Default, Debug)]
struct TestDriver {
    truncations: AtomicUsize,
}

impl DsDriver for TestDriver {
    fn ds_type(&self) -> &str {
        "mockdb"
    }
}

#[async_trait]
impl DsReader for TestDriver {
    async fn table_info(&self, endpoint: &TransferEndpoint) -> Result<TableInfo, DriverError> {
        Ok(TableInfo {
            schema: endpoint.schema.clone(),
            table: endpoint.table.clone(),
            columns: vec![],
        })
    }

    async fn max_cursor_value(
        &self,
        endpoint: &TransferEndpoint,
    ) -> Result<Option<String>, DriverError> {
        Ok(endpoint.cursor_column.as_ref().map(|_| "42".to_string()))
    }

    fn reader_spec(&self, endpoint: &TransferEndpoint) -> serde_json::Value {
        serde_json::json!({ "table": endpoint.table })
    }
}

#[async_trait]
impl DsWriter for TestDriver {
    async fn truncate(&self, _endpoint: &TransferEndpoint) -> Result<(), DriverError> {
        self.truncations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn table_info(&self, endpoint: &TransferEndpoint) -> Result<TableInfo, DriverError> {
        Ok(TableInfo {
            schema: endpoint.schema.clone(),
            table: endpoint.table.clone(),
            columns: vec![],
        })
    }

    fn writer_spec(&self, endpoint: &TransferEndpoint) -> serde_json::Value {
        serde_json::json!({ "table": endpoint.table })
    }
}

fn registry_with_mock_driver(driver: Arc<TestDriver>) -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry.register("mockdb", move |_connect_id| {
        Ok(DriverSet {
            driver: driver.clone() as Arc<dyn DsDriver>,
            reader: Some(driver.clone() as Arc<dyn DsReader>),
            writer: Some(driver.clone() as Arc<dyn DsWriter>),
            stream_reader: None,
            stream_writer: None,
        })
    });
    registry
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn endpoint(connect_id: &str, table: &str) -> TransferEndpoint {
    TransferEndpoint {
        connect_id: connect_id.to_string(),
        schema: "public".to_string(),
        table: table.to_string(),
        cursor_column: None,
    }
}

fn descriptor(overwrite: bool) -> JobDescriptor {
    JobDescriptor {
        job_id: "J1".to_string(),
        kind: JobKind::Batch,
        sync_unit: SyncUnit {
            reader: endpoint("mockdb://src/db", "TableA"),
            writer: endpoint("mockdb://dst/db", "TableB"),
        },
        overwrite,
    }
}

struct Harness {
    driver: Arc<TestDriver>,
    engine: Arc<MockEngine>,
    registry: Arc<MockRegistry>,
    hub: Arc<MessageHub>,
    action: Arc<BatchTransferAction>,
}

fn harness(engine: Arc<MockEngine>) -> Harness {
    let driver = Arc::new(TestDriver::default());
    let registry = Arc::new(MockRegistry::default());
    let hub = Arc::new(MessageHub::new(Arc::new(TopicWhitelist::new())));
    let action = Arc::new(
        BatchTransferAction::new(
            Arc::new(registry_with_mock_driver(driver.clone())),
            engine.clone(),
            registry.clone(),
            hub.clone(),
        )
        .with_poll_interval(Duration::from_millis(10)),
    );
    Harness {
        driver,
        engine,
        registry,
        hub,
        action,
    }
}

fn run_context(job_id: &str) -> RunContext {
    RunContext {
        job_id: job_id.to_string(),
        start_time: chrono::Utc::now(),
        counts: Arc::new(ExecCounts::new()),
        cancel: CancellationToken::new(),
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overwrite_batch_job_completes_and_cascades() {
    let h = harness(MockEngine::scripted(
        vec![running(), running(), finished(100, 98, 2)],
        vec![],
    ));

    let outcome = run_job(h.action.clone(), &descriptor(true), CancellationToken::new()).await;

    assert_matches!(
        outcome,
        RunOutcome::Success(metrics)
            if metrics.read_records == 100
                && metrics.write_records == 96
                && metrics.error_records == 2
    );

    // Truncate ran exactly once, before the single submission.
    assert_eq!(h.driver.truncations.load(Ordering::SeqCst), 1);
    assert_eq!(h.engine.submission_count(), 1);
    assert_eq!(
        h.registry.task_relations.lock().unwrap().as_slice(),
        [("J1".to_string(), "T1".to_string())]
    );

    // Created exactly once, first; exactly one terminal status.
    assert_eq!(
        h.registry.reported_statuses(),
        [JobStatus::Created, JobStatus::Success]
    );
    let updates = h.registry.statuses.lock().unwrap();
    assert_eq!(updates[0].counts.append_count, 0);
    assert_eq!(updates[1].counts.append_count, 100);
    assert_eq!(updates[1].counts.filter_count, 96);
    assert!(updates[1].error_message.is_none());
    drop(updates);

    assert_eq!(h.registry.cascades.lock().unwrap().as_slice(), ["J1"]);

    // One progress event per poll: two running polls plus the final one.
    assert_eq!(h.hub.stream().topic_len(JOB_PROGRESS_TOPIC), 3);
}

#[tokio::test]
async fn unknown_reader_type_fails_before_submission() {
    let h = harness(MockEngine::scripted(vec![], vec![]));

    let mut bad = descriptor(false);
    bad.sync_unit.reader.connect_id = "xdb://somewhere/db".to_string();

    let outcome = run_job(h.action.clone(), &bad, CancellationToken::new()).await;

    assert_matches!(outcome, RunOutcome::Failed { message, .. } if message.contains("xdb"));
    assert_eq!(h.engine.submission_count(), 0);
    assert_eq!(
        h.registry.reported_statuses(),
        [JobStatus::Created, JobStatus::Error]
    );
    assert!(h.registry.cascades.lock().unwrap().is_empty());
}

#[tokio::test]
async fn stop_before_submission_ends_stopped() {
    let h = harness(MockEngine::scripted(vec![], vec![]));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = run_job(h.action.clone(), &descriptor(true), cancel).await;

    assert_matches!(outcome, RunOutcome::Stopped);
    assert_eq!(h.engine.submission_count(), 0);
    assert_eq!(h.driver.truncations.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.registry.reported_statuses(),
        [JobStatus::Created, JobStatus::Stopped]
    );
    assert!(h.registry.cascades.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_task_surfaces_the_first_engine_exception() {
    let h = harness(MockEngine::scripted(
        vec![running(), failed()],
        vec!["row too wide for target".to_string(), "older error".to_string()],
    ));

    let outcome = run_job(h.action.clone(), &descriptor(false), CancellationToken::new()).await;

    assert_matches!(
        outcome,
        RunOutcome::Failed { message, .. } if message == "row too wide for target"
    );
    assert_eq!(
        h.registry.reported_statuses(),
        [JobStatus::Created, JobStatus::Error]
    );
    assert!(h.registry.cascades.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_task_without_exceptions_gets_the_generic_message() {
    let h = harness(MockEngine::scripted(vec![failed()], vec![]));

    let outcome = run_job(h.action.clone(), &descriptor(false), CancellationToken::new()).await;

    assert_matches!(
        outcome,
        RunOutcome::Failed { message, .. } if message == "data-transfer task failed."
    );
}

#[tokio::test]
async fn poll_error_terminates_the_monitor_loop() {
    // The status script is empty: the very first poll errors out.
    let h = harness(MockEngine::scripted(vec![], vec![]));

    let outcome = run_job(h.action.clone(), &descriptor(false), CancellationToken::new()).await;

    assert_matches!(
        outcome,
        RunOutcome::Failed { message, .. } if message.contains("status script exhausted")
    );
    assert_eq!(
        h.registry.reported_statuses(),
        [JobStatus::Created, JobStatus::Error]
    );
}

#[tokio::test]
async fn submission_is_idempotent_per_unit() {
    let h = harness(MockEngine::scripted(vec![], vec![]));
    let ctx = run_context("J1");

    let mut unit = ExecutionUnit::from_descriptor(&descriptor(false));
    h.action.before_exec(&ctx, &mut unit).await.unwrap();

    h.action.execute(&ctx, &mut unit).await.unwrap();
    assert_eq!(unit.task_id.as_deref(), Some("T1"));
    assert_eq!(h.engine.submission_count(), 1);

    // Second call with the task id already set must not submit again.
    h.action.execute(&ctx, &mut unit).await.unwrap();
    assert_eq!(h.engine.submission_count(), 1);
    assert_eq!(h.registry.task_relations.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn resumed_unit_with_preset_task_id_is_never_submitted() {
    let h = harness(MockEngine::scripted(vec![], vec![]));
    let ctx = run_context("J1");

    let mut unit = ExecutionUnit::from_descriptor(&descriptor(false));
    unit.task_id = Some("T9".to_string());

    h.action.execute(&ctx, &mut unit).await.unwrap();
    assert_eq!(h.engine.submission_count(), 0);
    assert_eq!(unit.task_id.as_deref(), Some("T9"));
}

#[tokio::test]
async fn cursor_high_water_mark_is_captured_and_persisted() {
    let h = harness(MockEngine::scripted(vec![finished(10, 10, 0)], vec![]));

    let mut with_cursor = descriptor(false);
    with_cursor.sync_unit.reader.cursor_column = Some("updated_at".to_string());

    let outcome = run_job(h.action.clone(), &with_cursor, CancellationToken::new()).await;

    assert_matches!(outcome, RunOutcome::Success(metrics) if metrics.cursor_value.as_deref() == Some("42"));
    assert_eq!(
        h.registry.cursors.lock().unwrap().as_slice(),
        [("J1".to_string(), Some("42".to_string()))]
    );
}

#[tokio::test]
async fn cursor_is_persisted_even_when_the_run_fails() {
    let h = harness(MockEngine::scripted(vec![failed()], vec![]));

    let mut with_cursor = descriptor(false);
    with_cursor.sync_unit.reader.cursor_column = Some("updated_at".to_string());

    let outcome = run_job(h.action.clone(), &with_cursor, CancellationToken::new()).await;

    assert_matches!(outcome, RunOutcome::Failed { .. });
    assert_eq!(
        h.registry.cursors.lock().unwrap().as_slice(),
        [("J1".to_string(), Some("42".to_string()))]
    );
}
