//! Shared core error type.

/// Domain-level error for the core crate.
///
/// Higher layers wrap this into their own error enums (e.g. the API's
/// `AppError`) to attach transport-specific behaviour.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Input failed a domain validation rule.
    #[error("{0}")]
    Validation(String),

    /// An invariant was violated that callers cannot recover from.
    #[error("{0}")]
    Internal(String),
}
