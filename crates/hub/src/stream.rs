//! Stream backend: durable per-topic log with consumer groups and
//! at-least-once delivery.
//!
//! The log is in-process (durability spans the process lifetime). Entries
//! delivered to a group move into that group's pending set and are removed
//! only by acknowledgment; a handler failure leaves the entry pending and
//! redeliverable by an external reconciler. The consumption loop itself
//! never redelivers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{HubError, RegistrationError};
use crate::hub::HubBackend;
use crate::message::{BackendKind, ConsumerRegistration, MessageEnvelope};

/// Messages read per loop iteration.
const READ_COUNT: usize = 1;

/// Bounded wait for a blocking group read.
const READ_BLOCK: Duration = Duration::from_secs(5);

/// Sleep after an empty read before retrying.
const EMPTY_SLEEP: Duration = Duration::from_secs(1);

/// Backoff after a read/ack-path error.
const ERROR_BACKOFF: Duration = Duration::from_secs(3);

/// One entry in a topic log.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    /// Monotonic per-topic id, starting at 1.
    pub id: u64,
    pub payload: String,
}

#[derive(Default)]
struct TopicLog {
    entries: Vec<StreamEntry>,
    next_id: u64,
    groups: HashMap<String, GroupState>,
}

#[derive(Default)]
struct GroupState {
    /// Id of the last entry delivered to this group.
    cursor: u64,
    /// Delivered but not yet acknowledged.
    pending: HashSet<u64>,
}

#[derive(Default)]
struct StreamState {
    topics: HashMap<String, TopicLog>,
}

/// Shared durable-log backend. Cheap to clone.
#[derive(Clone, Default)]
pub struct StreamBackend {
    inner: Arc<StreamInner>,
}

#[derive(Default)]
struct StreamInner {
    state: Mutex<StreamState>,
    notify: tokio::sync::Notify,
}

impl StreamBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload to a topic log. Returns the assigned entry id.
    pub fn append(&self, topic: &str, payload: &str) -> u64 {
        let id = {
            let mut state = self.inner.state.lock().expect("stream state poisoned");
            let log = state.topics.entry(topic.to_string()).or_default();
            log.next_id += 1;
            let id = log.next_id;
            log.entries.push(StreamEntry {
                id,
                payload: payload.to_string(),
            });
            id
        };
        self.inner.notify.notify_waiters();
        id
    }

    /// Ensure a consumer group exists for a topic.
    ///
    /// List-then-create: the check and the create are not atomic, and two
    /// racing consumers may both attempt the create. Re-creating an
    /// existing group is a no-op, never fatal.
    pub fn ensure_group(&self, topic: &str, group: &str) {
        let mut state = self.inner.state.lock().expect("stream state poisoned");
        let log = state.topics.entry(topic.to_string()).or_default();
        if log.groups.contains_key(group) {
            tracing::debug!(topic, group, "Consumer group already exists");
            return;
        }
        log.groups.insert(group.to_string(), GroupState::default());
        tracing::info!(topic, group, "Created consumer group");
    }

    /// Read up to `count` entries past the group cursor, blocking up to
    /// `block` when the log has nothing new.
    ///
    /// Delivered entries advance the cursor and join the group's pending
    /// set; they stay pending until [`StreamBackend::ack`].
    pub async fn read_group(
        &self,
        topic: &str,
        group: &str,
        count: usize,
        block: Duration,
    ) -> Vec<StreamEntry> {
        let deadline = tokio::time::Instant::now() + block;
        loop {
            let mut notified = std::pin::pin!(self.inner.notify.notified());
            // Register interest before checking so an append between the
            // check and the await still wakes us.
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock().expect("stream state poisoned");
                let delivered = Self::take_next(&mut state, topic, group, count);
                if !delivered.is_empty() {
                    return delivered;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => return Vec::new(),
            }
        }
    }

    fn take_next(
        state: &mut StreamState,
        topic: &str,
        group: &str,
        count: usize,
    ) -> Vec<StreamEntry> {
        let Some(log) = state.topics.get_mut(topic) else {
            return Vec::new();
        };
        let Some(group_state) = log.groups.get_mut(group) else {
            return Vec::new();
        };

        let delivered: Vec<StreamEntry> = log
            .entries
            .iter()
            .filter(|entry| entry.id > group_state.cursor)
            .take(count)
            .cloned()
            .collect();

        for entry in &delivered {
            group_state.cursor = entry.id;
            group_state.pending.insert(entry.id);
        }
        delivered
    }

    /// Acknowledge a delivered entry, removing it from the pending set.
    pub fn ack(&self, topic: &str, group: &str, entry_id: u64) -> Result<(), HubError> {
        let mut state = self.inner.state.lock().expect("stream state poisoned");
        let group_state = state
            .topics
            .get_mut(topic)
            .and_then(|log| log.groups.get_mut(group))
            .ok_or_else(|| {
                HubError::Backend(format!("unknown group \"{group}\" on topic \"{topic}\""))
            })?;
        group_state.pending.remove(&entry_id);
        Ok(())
    }

    /// Delivered-but-unacknowledged entries for a group. Observable by
    /// probes and the external reconciliation process.
    pub fn pending_count(&self, topic: &str, group: &str) -> usize {
        let state = self.inner.state.lock().expect("stream state poisoned");
        state
            .topics
            .get(topic)
            .and_then(|log| log.groups.get(group))
            .map(|g| g.pending.len())
            .unwrap_or(0)
    }

    /// Total entries appended to a topic.
    pub fn topic_len(&self, topic: &str) -> usize {
        let state = self.inner.state.lock().expect("stream state poisoned");
        state.topics.get(topic).map(|log| log.entries.len()).unwrap_or(0)
    }
}

#[async_trait]
impl HubBackend for StreamBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Stream
    }

    async fn produce(&self, envelope: &MessageEnvelope) -> Result<(), HubError> {
        self.append(&envelope.topic, &envelope.payload);
        Ok(())
    }

    fn start_consumer(
        &self,
        registration: ConsumerRegistration,
        cancel: CancellationToken,
    ) -> Result<tokio::task::JoinHandle<()>, RegistrationError> {
        if registration.group.is_empty() {
            return Err(RegistrationError::MissingGroup);
        }
        let backend = self.clone();
        Ok(tokio::spawn(async move {
            run_consumer_loop(backend, registration, cancel).await;
        }))
    }
}

/// One consumption loop: ensure the group, then read / deliver / ack until
/// cancelled. The loop never terminates on its own.
async fn run_consumer_loop(
    backend: StreamBackend,
    registration: ConsumerRegistration,
    cancel: CancellationToken,
) {
    let topic = registration.topic.as_str();
    let group = registration.group.as_str();
    let handler = registration.handler.as_ref();

    backend.ensure_group(topic, group);
    tracing::info!(topic, group, handler = handler.name(), "Stream consumer started");

    loop {
        let entries = tokio::select! {
            _ = cancel.cancelled() => break,
            entries = backend.read_group(topic, group, READ_COUNT, READ_BLOCK) => entries,
        };

        if entries.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(EMPTY_SLEEP) => continue,
            }
        }

        for entry in entries {
            match handler.handle(&entry.payload).await {
                Ok(()) => {
                    // At-least-once: acknowledge only after the handler
                    // returned without error.
                    if let Err(e) = backend.ack(topic, group, entry.id) {
                        tracing::error!(
                            topic,
                            group,
                            entry_id = entry.id,
                            error = %e,
                            "Stream consumer failed to acknowledge",
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(
                        topic,
                        group,
                        entry_id = entry.id,
                        handler = handler.name(),
                        error = %e,
                        "Handler failed; message left pending for redelivery",
                    );
                }
            }
        }
    }

    tracing::info!(topic, group, handler = handler.name(), "Stream consumer stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::BoxError;
    use crate::message::MessageHandler;

    struct RecordingHandler {
        received: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingHandler {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                received: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        fn name(&self) -> &str {
            "recording"
        }

        async fn handle(&self, payload: &str) -> Result<(), BoxError> {
            self.received.lock().unwrap().push(payload.to_string());
            if self.fail {
                return Err("handler rejected the payload".into());
            }
            Ok(())
        }
    }

    fn registration(handler: Arc<RecordingHandler>) -> ConsumerRegistration {
        ConsumerRegistration {
            topic: "t".to_string(),
            group: "g".to_string(),
            backend: BackendKind::Stream,
            handler,
        }
    }

    #[tokio::test]
    async fn read_moves_entries_to_pending_until_acked() {
        let backend = StreamBackend::new();
        backend.ensure_group("t", "g");
        let id = backend.append("t", "one");

        let entries = backend
            .read_group("t", "g", 1, Duration::from_millis(50))
            .await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload, "one");
        assert_eq!(backend.pending_count("t", "g"), 1);

        backend.ack("t", "g", id).unwrap();
        assert_eq!(backend.pending_count("t", "g"), 0);
    }

    #[tokio::test]
    async fn read_does_not_redeliver_past_the_cursor() {
        let backend = StreamBackend::new();
        backend.ensure_group("t", "g");
        backend.append("t", "one");

        let first = backend
            .read_group("t", "g", 1, Duration::from_millis(50))
            .await;
        assert_eq!(first.len(), 1);

        // Unacked, but the cursor has moved on: the loop never redelivers.
        let second = backend
            .read_group("t", "g", 1, Duration::from_millis(50))
            .await;
        assert!(second.is_empty());
        assert_eq!(backend.pending_count("t", "g"), 1);
    }

    #[tokio::test]
    async fn blocking_read_wakes_on_append() {
        let backend = StreamBackend::new();
        backend.ensure_group("t", "g");

        let reader = backend.clone();
        let read = tokio::spawn(async move {
            reader.read_group("t", "g", 1, Duration::from_secs(5)).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        backend.append("t", "late");

        let entries = read.await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload, "late");
    }

    #[tokio::test]
    async fn ensure_group_tolerates_duplicate_create() {
        let backend = StreamBackend::new();
        backend.ensure_group("t", "g");
        backend.append("t", "one");
        let _ = backend
            .read_group("t", "g", 1, Duration::from_millis(50))
            .await;

        // Re-creating must not reset the cursor or the pending set.
        backend.ensure_group("t", "g");
        assert_eq!(backend.pending_count("t", "g"), 1);
        let again = backend
            .read_group("t", "g", 1, Duration::from_millis(50))
            .await;
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn two_groups_each_receive_every_entry() {
        let backend = StreamBackend::new();
        backend.ensure_group("t", "g1");
        backend.ensure_group("t", "g2");
        backend.append("t", "shared");

        let a = backend
            .read_group("t", "g1", 1, Duration::from_millis(50))
            .await;
        let b = backend
            .read_group("t", "g2", 1, Duration::from_millis(50))
            .await;
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[tokio::test]
    async fn loop_acks_only_when_handler_succeeds() {
        let backend = StreamBackend::new();
        let handler = RecordingHandler::new(false);
        let cancel = CancellationToken::new();
        backend.append("t", "payload");

        let task = backend
            .start_consumer(registration(handler.clone()), cancel.clone())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handler.received.lock().unwrap().as_slice(), ["payload"]);
        assert_eq!(backend.pending_count("t", "g"), 0);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn failed_handler_leaves_entry_pending() {
        let backend = StreamBackend::new();
        let handler = RecordingHandler::new(true);
        let cancel = CancellationToken::new();
        backend.append("t", "poison");

        let task = backend
            .start_consumer(registration(handler.clone()), cancel.clone())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handler.received.lock().unwrap().len(), 1);
        assert_eq!(backend.pending_count("t", "g"), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn consumer_without_group_is_rejected() {
        let backend = StreamBackend::new();
        let mut reg = registration(RecordingHandler::new(false));
        reg.group = String::new();

        let result = backend.start_consumer(reg, CancellationToken::new());
        assert!(matches!(result, Err(RegistrationError::MissingGroup)));
    }
}
