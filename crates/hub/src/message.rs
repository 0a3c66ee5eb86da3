//! Envelope, handler, and registration types shared by all backends.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BoxError;

/// Which delivery backend an envelope or registration targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Durable per-topic log with consumer groups, at-least-once.
    Stream,
    /// Competing consumers, single delivery.
    Queue,
    /// Fire-and-forget broadcast, no durability.
    PubSub,
}

/// One message on its way to a backend. Transient; constructed per
/// `produce` call.
#[derive(Debug, Clone)]
pub struct MessageEnvelope {
    pub topic: String,
    pub group: String,
    pub backend: BackendKind,
    pub payload: String,
}

/// Consumer callback bound to a registration.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Stable handler name; part of the consumer identity key.
    fn name(&self) -> &str;

    /// Process one payload. Returning an error leaves the message
    /// unacknowledged on backends that track acknowledgment.
    async fn handle(&self, payload: &str) -> Result<(), BoxError>;
}

/// Durable subscription intent: created at process start from declared
/// handlers, owned by the hub's consumption loop once registered.
#[derive(Clone)]
pub struct ConsumerRegistration {
    pub topic: String,
    pub group: String,
    pub backend: BackendKind,
    pub handler: Arc<dyn MessageHandler>,
}

impl std::fmt::Debug for ConsumerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerRegistration")
            .field("topic", &self.topic)
            .field("group", &self.group)
            .field("backend", &self.backend)
            .field("handler", &self.handler.name())
            .finish()
    }
}
