//! Explicit driver registry: data-source type tag -> driver factory.

use std::collections::HashMap;
use std::sync::Arc;

use crate::builtin;
use crate::capability::{DriverSet, DsDriver, DsReader, DsWriter, StreamReader, StreamWriter};
use crate::connect::ds_type;
use crate::error::DriverError;

/// Constructs a [`DriverSet`] for one connect id.
pub type DriverFactory = Box<dyn Fn(&str) -> Result<DriverSet, DriverError> + Send + Sync>;

/// Startup-built table of supported data-source types.
///
/// Resolution is a two-step operation: build the driver set for the
/// connect id's type tag, then check the requested capability slot.
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// An empty registry. Most callers want [`DriverRegistry::with_builtin`].
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry pre-populated with the built-in driver set.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        builtin::register_builtin(&mut registry);
        registry
    }

    /// Register a factory for a type tag. Re-registering a tag replaces
    /// the previous factory.
    pub fn register(
        &mut self,
        tag: impl Into<String>,
        factory: impl Fn(&str) -> Result<DriverSet, DriverError> + Send + Sync + 'static,
    ) {
        self.factories.insert(tag.into(), Box::new(factory));
    }

    /// Registered type tags, for diagnostics.
    pub fn supported_types(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    fn build(&self, connect_id: &str) -> Result<DriverSet, DriverError> {
        let tag = ds_type(connect_id)?;
        let factory = self
            .factories
            .get(&tag)
            .ok_or_else(|| DriverError::DriverNotFound(tag.clone()))?;

        factory(connect_id).map_err(|cause| {
            tracing::error!(ds_type = %tag, error = %cause, "Driver init failed");
            DriverError::DriverInitError {
                ds_type: tag,
                cause: cause.to_string(),
            }
        })
    }

    /// Resolve the base driver for a connect id.
    pub fn resolve_driver(&self, connect_id: &str) -> Result<Arc<dyn DsDriver>, DriverError> {
        Ok(self.build(connect_id)?.driver)
    }

    /// Resolve the batch read capability for a connect id.
    pub fn resolve_reader(&self, connect_id: &str) -> Result<Arc<dyn DsReader>, DriverError> {
        let set = self.build(connect_id)?;
        set.reader.ok_or_else(|| DriverError::CapabilityUnsupported {
            ds_type: set.driver.ds_type().to_string(),
            capability: "reader",
        })
    }

    /// Resolve the batch write capability for a connect id.
    pub fn resolve_writer(&self, connect_id: &str) -> Result<Arc<dyn DsWriter>, DriverError> {
        let set = self.build(connect_id)?;
        set.writer.ok_or_else(|| DriverError::CapabilityUnsupported {
            ds_type: set.driver.ds_type().to_string(),
            capability: "writer",
        })
    }

    /// Resolve the stream-source capability for a connect id.
    pub fn resolve_stream_reader(
        &self,
        connect_id: &str,
    ) -> Result<Arc<dyn StreamReader>, DriverError> {
        let set = self.build(connect_id)?;
        set.stream_reader
            .ok_or_else(|| DriverError::CapabilityUnsupported {
                ds_type: set.driver.ds_type().to_string(),
                capability: "stream reader",
            })
    }

    /// Resolve the stream-sink capability for a connect id.
    pub fn resolve_stream_writer(
        &self,
        connect_id: &str,
    ) -> Result<Arc<dyn StreamWriter>, DriverError> {
        let set = self.build(connect_id)?;
        set.stream_writer
            .ok_or_else(|| DriverError::CapabilityUnsupported {
                ds_type: set.driver.ds_type().to_string(),
                capability: "stream writer",
            })
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
