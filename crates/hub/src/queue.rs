//! Queue backend: competing consumers, single delivery.
//!
//! Interface-compatible with the stream backend but without consumer
//! groups or acknowledgment replay: a popped message is gone even if its
//! handler fails (the failure is logged).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{HubError, RegistrationError};
use crate::hub::HubBackend;
use crate::message::{BackendKind, ConsumerRegistration, MessageEnvelope};

/// Bounded wait for a blocking pop.
const POP_BLOCK: Duration = Duration::from_secs(5);

/// Sleep after an empty pop before retrying.
const EMPTY_SLEEP: Duration = Duration::from_secs(1);

/// Shared in-process queue backend. Cheap to clone.
#[derive(Clone, Default)]
pub struct QueueBackend {
    inner: Arc<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    notify: tokio::sync::Notify,
}

impl QueueBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a payload onto a topic queue.
    pub fn push(&self, topic: &str, payload: &str) {
        {
            let mut queues = self.inner.queues.lock().expect("queue state poisoned");
            queues
                .entry(topic.to_string())
                .or_default()
                .push_back(payload.to_string());
        }
        self.inner.notify.notify_waiters();
    }

    /// Pop the next payload, blocking up to `block` when the queue is
    /// empty. Exactly one competing consumer receives each message.
    pub async fn pop_wait(&self, topic: &str, block: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + block;
        loop {
            let mut notified = std::pin::pin!(self.inner.notify.notified());
            notified.as_mut().enable();

            {
                let mut queues = self.inner.queues.lock().expect("queue state poisoned");
                if let Some(payload) = queues.get_mut(topic).and_then(VecDeque::pop_front) {
                    return Some(payload);
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => return None,
            }
        }
    }

    /// Messages currently queued on a topic.
    pub fn len(&self, topic: &str) -> usize {
        let queues = self.inner.queues.lock().expect("queue state poisoned");
        queues.get(topic).map(VecDeque::len).unwrap_or(0)
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }
}

#[async_trait]
impl HubBackend for QueueBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Queue
    }

    async fn produce(&self, envelope: &MessageEnvelope) -> Result<(), HubError> {
        self.push(&envelope.topic, &envelope.payload);
        Ok(())
    }

    fn start_consumer(
        &self,
        registration: ConsumerRegistration,
        cancel: CancellationToken,
    ) -> Result<tokio::task::JoinHandle<()>, RegistrationError> {
        let backend = self.clone();
        Ok(tokio::spawn(async move {
            run_consumer_loop(backend, registration, cancel).await;
        }))
    }
}

async fn run_consumer_loop(
    backend: QueueBackend,
    registration: ConsumerRegistration,
    cancel: CancellationToken,
) {
    let topic = registration.topic.as_str();
    let handler = registration.handler.as_ref();
    tracing::info!(topic, handler = handler.name(), "Queue consumer started");

    loop {
        let popped = tokio::select! {
            _ = cancel.cancelled() => break,
            popped = backend.pop_wait(topic, POP_BLOCK) => popped,
        };

        match popped {
            Some(payload) => {
                if let Err(e) = handler.handle(&payload).await {
                    // Single delivery: the message is already gone.
                    tracing::error!(
                        topic,
                        handler = handler.name(),
                        error = %e,
                        "Queue handler failed; message dropped",
                    );
                }
            }
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(EMPTY_SLEEP) => {}
                }
            }
        }
    }

    tracing::info!(topic, handler = handler.name(), "Queue consumer stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn each_message_is_delivered_once() {
        let backend = QueueBackend::new();
        backend.push("t", "a");
        backend.push("t", "b");

        assert_eq!(
            backend.pop_wait("t", Duration::from_millis(50)).await,
            Some("a".to_string())
        );
        assert_eq!(
            backend.pop_wait("t", Duration::from_millis(50)).await,
            Some("b".to_string())
        );
        assert_eq!(backend.pop_wait("t", Duration::from_millis(50)).await, None);
    }

    #[tokio::test]
    async fn competing_consumers_split_the_work() {
        let backend = QueueBackend::new();
        backend.push("t", "only");

        let first = backend.pop_wait("t", Duration::from_millis(50)).await;
        let second = backend.pop_wait("t", Duration::from_millis(50)).await;

        assert_eq!(first, Some("only".to_string()));
        assert_eq!(second, None);
        assert!(backend.is_empty("t"));
    }

    #[tokio::test]
    async fn blocking_pop_wakes_on_push() {
        let backend = QueueBackend::new();

        let popper = backend.clone();
        let pop = tokio::spawn(async move { popper.pop_wait("t", Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        backend.push("t", "late");

        assert_eq!(pop.await.unwrap(), Some("late".to_string()));
    }
}
