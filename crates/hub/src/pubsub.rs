//! Pub/sub backend: fire-and-forget broadcast to current subscribers.
//!
//! No durability, no acknowledgment. A publish with zero subscribers is
//! dropped silently; a lagging subscriber loses the overwritten messages
//! and keeps going.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::{HubError, RegistrationError};
use crate::hub::HubBackend;
use crate::message::{BackendKind, ConsumerRegistration, MessageEnvelope};

/// Buffer capacity per topic channel.
const CHANNEL_CAPACITY: usize = 1024;

/// Shared broadcast backend. Cheap to clone.
#[derive(Clone, Default)]
pub struct PubSubBackend {
    senders: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
}

impl PubSubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<String> {
        let mut senders = self.senders.lock().expect("pubsub state poisoned");
        senders
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Subscribe to a topic. Only messages published after this call are
    /// received.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        self.sender(topic).subscribe()
    }

    /// Publish to all current subscribers of a topic.
    pub fn publish(&self, topic: &str, payload: &str) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender(topic).send(payload.to_string());
    }
}

#[async_trait]
impl HubBackend for PubSubBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::PubSub
    }

    async fn produce(&self, envelope: &MessageEnvelope) -> Result<(), HubError> {
        self.publish(&envelope.topic, &envelope.payload);
        Ok(())
    }

    fn start_consumer(
        &self,
        registration: ConsumerRegistration,
        cancel: CancellationToken,
    ) -> Result<tokio::task::JoinHandle<()>, RegistrationError> {
        let mut receiver = self.subscribe(&registration.topic);
        Ok(tokio::spawn(async move {
            let topic = registration.topic.as_str();
            let handler = registration.handler.as_ref();
            tracing::info!(topic, handler = handler.name(), "Pub/sub consumer started");

            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = receiver.recv() => received,
                };

                match received {
                    Ok(payload) => {
                        if let Err(e) = handler.handle(&payload).await {
                            tracing::error!(
                                topic,
                                handler = handler.name(),
                                error = %e,
                                "Pub/sub handler failed",
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(topic, skipped, "Pub/sub consumer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            tracing::info!(topic, handler = handler.name(), "Pub/sub consumer stopped");
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
