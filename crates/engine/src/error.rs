//! Engine error taxonomy.

use datalift_driver::DriverError;

/// Errors raised across the job lifecycle.
///
/// Driver and submission errors abort a run before the monitor task
/// starts; poll errors terminate the monitor loop. All of them resolve to
/// a terminal `Error` job status with the causing message. `Cancelled` is
/// the exception: it surfaces to the caller as a `Stopped` outcome
/// instead of being absorbed into an error report.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Driver resolution or a driver operation failed.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// The external transfer engine rejected the submission.
    #[error("submission failed: {0}")]
    Submission(String),

    /// A status/exception query failed, or the task ended failed/canceled.
    #[error("{0}")]
    Poll(String),

    /// A job registry call failed.
    #[error("job registry call failed: {0}")]
    Registry(String),

    /// A message hub publish failed.
    #[error("message hub publish failed: {0}")]
    Hub(String),

    /// Cooperative stop observed before submission.
    #[error("job cancelled before submission")]
    Cancelled,
}
