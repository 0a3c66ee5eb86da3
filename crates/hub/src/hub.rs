//! The message hub: backend routing, consumer bookkeeping, supervision.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{HubError, RegistrationError};
use crate::message::{BackendKind, ConsumerRegistration, MessageEnvelope};
use crate::pubsub::PubSubBackend;
use crate::queue::QueueBackend;
use crate::stream::StreamBackend;
use crate::whitelist::TopicWhitelist;

/// Pause before respawning a panicked consumption task.
const RESPAWN_DELAY: Duration = Duration::from_secs(1);

/// One delivery backend behind the hub's produce/consume contract.
#[async_trait]
pub trait HubBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Accept one envelope for delivery.
    async fn produce(&self, envelope: &MessageEnvelope) -> Result<(), HubError>;

    /// Start the long-running consumption task for a registration.
    fn start_consumer(
        &self,
        registration: ConsumerRegistration,
        cancel: CancellationToken,
    ) -> Result<tokio::task::JoinHandle<()>, RegistrationError>;
}

/// Identity of a registered consumer: (topic, group, handler name).
type ConsumerKey = (String, String, String);

struct ConsumerTask {
    /// Join handle of the supervisor, not the consumption task itself;
    /// it outlives respawns.
    handle: tokio::task::JoinHandle<()>,
}

/// Multi-backend publish/subscribe hub.
pub struct MessageHub {
    backends: HashMap<BackendKind, Arc<dyn HubBackend>>,
    stream: StreamBackend,
    consumers: Mutex<HashMap<ConsumerKey, ConsumerTask>>,
    whitelist: Arc<TopicWhitelist>,
    cancel: CancellationToken,
}

impl MessageHub {
    /// A hub with the real in-process backends.
    pub fn new(whitelist: Arc<TopicWhitelist>) -> Self {
        let stream = StreamBackend::new();
        let mut backends: HashMap<BackendKind, Arc<dyn HubBackend>> = HashMap::new();
        backends.insert(BackendKind::Stream, Arc::new(stream.clone()));
        backends.insert(BackendKind::Queue, Arc::new(QueueBackend::new()));
        backends.insert(BackendKind::PubSub, Arc::new(PubSubBackend::new()));

        Self {
            backends,
            stream,
            consumers: Mutex::new(HashMap::new()),
            whitelist,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace one backend implementation. Used by tests to inject
    /// failing backends; production wiring keeps the defaults.
    pub fn with_backend(mut self, kind: BackendKind, backend: Arc<dyn HubBackend>) -> Self {
        self.backends.insert(kind, backend);
        self
    }

    /// The built-in stream backend, for pending-set probes.
    pub fn stream(&self) -> &StreamBackend {
        &self.stream
    }

    /// Route an envelope to its backend.
    ///
    /// The whitelist is advisory: an unknown topic logs a warning and the
    /// message is delivered anyway. An empty whitelist (before the first
    /// successful reload) suppresses the check entirely.
    pub async fn produce(&self, envelope: &MessageEnvelope) -> Result<(), HubError> {
        if !self.whitelist.is_empty() && !self.whitelist.contains_topic(&envelope.topic) {
            tracing::warn!(
                topic = %envelope.topic,
                backend = ?envelope.backend,
                "Producing to a topic outside the whitelist",
            );
        }

        let backend = self
            .backends
            .get(&envelope.backend)
            .ok_or(HubError::UnknownBackend(envelope.backend))?;
        backend.produce(envelope).await
    }

    /// Register a consumer and start its supervised consumption task.
    ///
    /// Exactly one live task may exist per (topic, group, handler name);
    /// a second registration while the first is alive fails with
    /// [`RegistrationError::AlreadyRegistered`], which is what makes
    /// retry-until-success convergent.
    pub fn register_consumer(
        &self,
        registration: ConsumerRegistration,
    ) -> Result<(), RegistrationError> {
        if registration.backend == BackendKind::Stream && registration.group.is_empty() {
            return Err(RegistrationError::MissingGroup);
        }

        let backend = self
            .backends
            .get(&registration.backend)
            .ok_or_else(|| {
                RegistrationError::Backend(format!(
                    "no backend registered for kind {:?}",
                    registration.backend
                ))
            })?
            .clone();

        let key: ConsumerKey = (
            registration.topic.clone(),
            registration.group.clone(),
            registration.handler.name().to_string(),
        );

        let mut consumers = self.consumers.lock().expect("consumer table poisoned");
        if let Some(existing) = consumers.get(&key) {
            if !existing.handle.is_finished() {
                return Err(RegistrationError::AlreadyRegistered {
                    topic: key.0,
                    group: key.1,
                    handler: key.2,
                });
            }
            consumers.remove(&key);
        }

        let task_cancel = self.cancel.child_token();
        // The first start runs synchronously so registration failures
        // surface to the caller (and from there to the retry queue).
        let first = backend.start_consumer(registration.clone(), task_cancel.child_token())?;

        let handle = tokio::spawn(supervise(backend, registration, first, task_cancel));
        consumers.insert(key, ConsumerTask { handle });
        Ok(())
    }

    /// Whether a live consumption task exists for the key.
    pub fn consumer_alive(&self, topic: &str, group: &str, handler: &str) -> bool {
        let consumers = self.consumers.lock().expect("consumer table poisoned");
        consumers
            .get(&(topic.to_string(), group.to_string(), handler.to_string()))
            .map(|task| !task.handle.is_finished())
            .unwrap_or(false)
    }

    /// Number of live consumption tasks.
    pub fn live_consumer_count(&self) -> usize {
        let consumers = self.consumers.lock().expect("consumer table poisoned");
        consumers
            .values()
            .filter(|task| !task.handle.is_finished())
            .count()
    }

    /// Cancel every consumption task. Tasks exit at their next
    /// suspension point.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Supervisor for one consumption task: respawn after a panic, exit on
/// normal completion (shutdown cancel).
async fn supervise(
    backend: Arc<dyn HubBackend>,
    registration: ConsumerRegistration,
    mut current: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
) {
    loop {
        match (&mut current).await {
            Ok(()) => break,
            Err(e) if e.is_panic() => {
                tracing::warn!(
                    topic = %registration.topic,
                    group = %registration.group,
                    handler = registration.handler.name(),
                    "Consumption task panicked; respawning",
                );
                if cancel.is_cancelled() {
                    break;
                }
                tokio::time::sleep(RESPAWN_DELAY).await;
                match backend.start_consumer(registration.clone(), cancel.child_token()) {
                    Ok(handle) => current = handle,
                    Err(e) => {
                        tracing::error!(
                            topic = %registration.topic,
                            error = %e,
                            "Failed to respawn consumption task",
                        );
                        break;
                    }
                }
            }
            // Aborted: the runtime is going down.
            Err(_) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
