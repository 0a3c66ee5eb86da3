//! Hub error types.

use crate::message::BackendKind;

/// Boxed error type returned by message handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from the produce path.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The envelope names a backend kind the hub has no implementation for.
    #[error("no backend registered for kind \"{0:?}\"")]
    UnknownBackend(BackendKind),

    /// The backend failed to accept the message.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors from consumer registration.
///
/// Never fatal to the process: failed registrations go onto the retry
/// queue and are re-attempted indefinitely by default.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// Stream consumers must name a delivery group.
    #[error("stream consumers must declare a delivery group")]
    MissingGroup,

    /// A live consumption task already exists for this key. The retry
    /// worker treats this as success: the registration intent is
    /// satisfied exactly once.
    #[error("consumer already registered for topic \"{topic}\" group \"{group}\" handler \"{handler}\"")]
    AlreadyRegistered {
        topic: String,
        group: String,
        handler: String,
    },

    /// The backend rejected the registration.
    #[error("backend error: {0}")]
    Backend(String),
}
