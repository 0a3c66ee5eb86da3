//! Core domain types for the datalift platform.
//!
//! This crate has no internal dependencies and no IO. It defines the job
//! descriptor model, transfer metrics and per-run count aggregation, topic
//! naming, and the shared core error type.

pub mod error;
pub mod job;
pub mod metrics;
pub mod topics;

pub use error::CoreError;
