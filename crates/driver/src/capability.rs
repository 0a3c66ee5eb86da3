//! Driver capability traits and the per-type capability bundle.

use std::sync::Arc;

use async_trait::async_trait;
use datalift_core::job::TransferEndpoint;

use crate::error::DriverError;

/// Interface-level description of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub schema: String,
    pub table: String,
    pub columns: Vec<String>,
}

/// Base driver trait implemented by every data-source driver.
pub trait DsDriver: Send + Sync + std::fmt::Debug {
    /// The data-source type tag this driver serves.
    fn ds_type(&self) -> &str;
}

/// Batch read capability.
#[async_trait]
pub trait DsReader: Send + Sync + std::fmt::Debug {
    async fn table_info(&self, endpoint: &TransferEndpoint) -> Result<TableInfo, DriverError>;

    /// Highest value of the endpoint's cursor column, for incremental sync.
    /// `None` when the endpoint has no cursor column or the table is empty.
    async fn max_cursor_value(
        &self,
        endpoint: &TransferEndpoint,
    ) -> Result<Option<String>, DriverError>;

    /// Reader job specification submitted to the external transfer engine.
    fn reader_spec(&self, endpoint: &TransferEndpoint) -> serde_json::Value;
}

/// Batch write capability.
#[async_trait]
pub trait DsWriter: Send + Sync + std::fmt::Debug {
    /// Destructive: remove all rows from the endpoint's table.
    async fn truncate(&self, endpoint: &TransferEndpoint) -> Result<(), DriverError>;

    async fn table_info(&self, endpoint: &TransferEndpoint) -> Result<TableInfo, DriverError>;

    /// Writer job specification submitted to the external transfer engine.
    fn writer_spec(&self, endpoint: &TransferEndpoint) -> serde_json::Value;
}

/// Stream-source capability.
pub trait StreamReader: Send + Sync {
    fn stream_spec(&self, endpoint: &TransferEndpoint) -> serde_json::Value;
}

/// Stream-sink capability.
pub trait StreamWriter: Send + Sync {
    fn stream_spec(&self, endpoint: &TransferEndpoint) -> serde_json::Value;
}

/// The capabilities one driver instance exposes.
///
/// Produced by a registered factory. Resolution checks a capability by
/// looking at the corresponding slot; an empty slot is a typed
/// `CapabilityUnsupported`, never a cast failure.
#[derive(Clone)]
pub struct DriverSet {
    pub driver: Arc<dyn DsDriver>,
    pub reader: Option<Arc<dyn DsReader>>,
    pub writer: Option<Arc<dyn DsWriter>>,
    pub stream_reader: Option<Arc<dyn StreamReader>>,
    pub stream_writer: Option<Arc<dyn StreamWriter>>,
}
