//! Multi-backend publish/subscribe hub.
//!
//! [`MessageHub`](hub::MessageHub) routes envelopes to interchangeable
//! backends (durable stream with consumer groups, competing-consumer
//! queue, fire-and-forget broadcast), supervises one consumption task per
//! registered consumer, retries failed registrations in the background,
//! and consults a periodically refreshed topic whitelist.

pub mod error;
pub mod hub;
pub mod message;
pub mod pubsub;
pub mod queue;
pub mod retry;
pub mod stream;
pub mod whitelist;

pub use error::{BoxError, HubError, RegistrationError};
pub use hub::{HubBackend, MessageHub};
pub use message::{BackendKind, ConsumerRegistration, MessageEnvelope, MessageHandler};
pub use retry::{bootstrap_consumers, run_retry_worker, RegistrationRetry};
pub use whitelist::{run_reloader, TopicWhitelist};
