//! Job descriptor model: what one data-transfer run moves and how.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// Kind of transfer a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// One-shot table-to-table copy.
    Batch,
    /// Computed/derived transfer.
    Compute,
    /// Continuous stream ingestion.
    Streaming,
}

impl JobKind {
    /// Stable lowercase tag, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Batch => "batch",
            JobKind::Compute => "compute",
            JobKind::Streaming => "streaming",
        }
    }
}

/// Lifecycle status of a job run.
///
/// `Created` is reported exactly once at run start; exactly one of the
/// terminal values (`Success`, `Error`, `Stopped`) is reported at run end.
/// A run never re-enters `Created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Success,
    Error,
    Stopped,
}

impl JobStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        match self {
            JobStatus::Created => 0,
            JobStatus::Success => 1,
            JobStatus::Error => 2,
            JobStatus::Stopped => 3,
        }
    }

    /// Look up a status by its database ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            0 => Some(JobStatus::Created),
            1 => Some(JobStatus::Success),
            2 => Some(JobStatus::Error),
            3 => Some(JobStatus::Stopped),
            _ => None,
        }
    }

    /// Whether this status ends a run.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Created)
    }
}

/// One side of a sync unit: where data is read from or written to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEndpoint {
    /// Connection identifier, `<type>://<locator>` (e.g.
    /// `postgres://user@host:5432/appdb`).
    pub connect_id: String,
    /// Schema the table lives in.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Reader-side incremental field, if the transfer is cursor-based.
    #[serde(default)]
    pub cursor_column: Option<String>,
}

/// The reader/writer pair a job moves data between.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncUnit {
    pub reader: TransferEndpoint,
    pub writer: TransferEndpoint,
}

/// Input specification for one data-transfer run.
///
/// Immutable once dispatched to the engine for a given run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Caller-assigned job identifier.
    pub job_id: String,
    pub kind: JobKind,
    pub sync_unit: SyncUnit,
    /// When set, the writer table is truncated before any data flows.
    #[serde(default)]
    pub overwrite: bool,
}

impl JobDescriptor {
    /// Validate the descriptor before dispatch.
    ///
    /// Rules:
    /// - `job_id` must not be empty.
    /// - Both endpoints must carry a connect id and a table name.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.job_id.is_empty() {
            return Err(CoreError::Validation(
                "Job id must not be empty".to_string(),
            ));
        }
        validate_endpoint(&self.sync_unit.reader, "reader")?;
        validate_endpoint(&self.sync_unit.writer, "writer")?;
        Ok(())
    }
}

fn validate_endpoint(endpoint: &TransferEndpoint, side: &str) -> Result<(), CoreError> {
    if endpoint.connect_id.is_empty() {
        return Err(CoreError::Validation(format!(
            "The {side} endpoint must have a connect id"
        )));
    }
    if endpoint.table.is_empty() {
        return Err(CoreError::Validation(format!(
            "The {side} endpoint must have a table name"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(connect_id: &str, table: &str) -> TransferEndpoint {
        TransferEndpoint {
            connect_id: connect_id.to_string(),
            schema: "public".to_string(),
            table: table.to_string(),
            cursor_column: None,
        }
    }

    fn descriptor() -> JobDescriptor {
        JobDescriptor {
            job_id: "j1".to_string(),
            kind: JobKind::Batch,
            sync_unit: SyncUnit {
                reader: endpoint("postgres://src/db", "orders"),
                writer: endpoint("postgres://dst/db", "orders_copy"),
            },
            overwrite: false,
        }
    }

    #[test]
    fn valid_descriptor_passes() {
        assert!(descriptor().validate().is_ok());
    }

    #[test]
    fn empty_job_id_rejected() {
        let mut d = descriptor();
        d.job_id = String::new();
        assert!(d.validate().is_err());
    }

    #[test]
    fn empty_reader_connect_id_rejected() {
        let mut d = descriptor();
        d.sync_unit.reader.connect_id = String::new();
        assert!(d.validate().is_err());
    }

    #[test]
    fn empty_writer_table_rejected() {
        let mut d = descriptor();
        d.sync_unit.writer.table = String::new();
        assert!(d.validate().is_err());
    }

    #[test]
    fn status_ids_round_trip() {
        for status in [
            JobStatus::Created,
            JobStatus::Success,
            JobStatus::Error,
            JobStatus::Stopped,
        ] {
            assert_eq!(JobStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(JobStatus::from_id(42), None);
    }

    #[test]
    fn created_is_the_only_non_terminal_status() {
        assert!(!JobStatus::Created.is_terminal());
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Stopped.is_terminal());
    }

    #[test]
    fn descriptor_serde_uses_lowercase_tags() {
        let json = serde_json::to_value(descriptor()).unwrap();
        assert_eq!(json["kind"], "batch");
        let parsed: JobDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.kind, JobKind::Batch);
        assert!(!parsed.overwrite);
    }
}
