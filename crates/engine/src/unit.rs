//! Execution unit: the run-scoped materialization of a job descriptor.

use std::sync::Arc;

use datalift_core::job::{JobDescriptor, TransferEndpoint};
use datalift_core::metrics::TransferMetrics;
use datalift_driver::{DsReader, DsWriter};

/// Mutable state for one job run.
///
/// Owned by exactly one run: the caller builds it, hands it to the
/// monitor task by move, and receives it back through the join handle.
/// The task id is assigned once; a unit that already carries one is never
/// re-submitted.
pub struct ExecutionUnit {
    pub job_id: String,
    pub reader: TransferEndpoint,
    pub writer: TransferEndpoint,
    pub overwrite: bool,
    /// Resolved by `before_exec`.
    pub reader_driver: Option<Arc<dyn DsReader>>,
    pub writer_driver: Option<Arc<dyn DsWriter>>,
    /// External engine task id; set once at submission.
    pub task_id: Option<String>,
    /// Latest metrics snapshot, recomputed on every poll.
    pub metrics: TransferMetrics,
}

impl ExecutionUnit {
    /// Derive a fresh unit from a descriptor.
    pub fn from_descriptor(descriptor: &JobDescriptor) -> Self {
        Self {
            job_id: descriptor.job_id.clone(),
            reader: descriptor.sync_unit.reader.clone(),
            writer: descriptor.sync_unit.writer.clone(),
            overwrite: descriptor.overwrite,
            reader_driver: None,
            writer_driver: None,
            task_id: None,
            metrics: TransferMetrics::default(),
        }
    }
}
