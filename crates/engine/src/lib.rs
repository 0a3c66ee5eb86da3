//! Job execution engine.
//!
//! [`lifecycle::run_job`] drives a job through the fixed lifecycle —
//! report created, convert, cancellation check, prepare, submit, poll on a
//! dedicated monitor task, reconcile counters, finalize, cascade — with
//! every step an overridable hook on [`lifecycle::TransferAction`].
//! [`transfer::BatchTransferAction`] implements the hooks for batch
//! table-to-table transfers against the external transfer engine.

pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod remote;
pub mod transfer;
pub mod unit;

pub use error::EngineError;
pub use lifecycle::{run_job, ExecCounts, RunContext, RunOutcome, TransferAction};
pub use registry::{JobRegistry, JobStateUpdate};
pub use remote::{ExecutionEngine, HttpExecutionEngine, TaskState, TaskStatus};
pub use transfer::BatchTransferAction;
pub use unit::ExecutionUnit;
