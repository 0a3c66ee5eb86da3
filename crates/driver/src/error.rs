//! Driver resolution and operation errors.

/// Errors surfaced by driver resolution and driver operations.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The connect id does not carry a `<type>://` prefix.
    #[error("malformed connect id: \"{0}\"")]
    MalformedConnectId(String),

    /// No driver is registered for the data-source type tag.
    #[error("no driver registered for data-source type \"{0}\"")]
    DriverNotFound(String),

    /// The driver factory failed to construct a driver set.
    #[error("driver init error for type \"{ds_type}\": {cause}")]
    DriverInitError { ds_type: String, cause: String },

    /// The driver exists but does not expose the requested capability.
    #[error("driver \"{ds_type}\" does not support the {capability} capability")]
    CapabilityUnsupported {
        ds_type: String,
        capability: &'static str,
    },

    /// A database operation issued by a driver failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
