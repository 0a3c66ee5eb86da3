//! Consumer registration retry.
//!
//! Declared handlers are registered once at process start; a failed
//! registration is queued rather than dropped, and a single background
//! worker re-attempts it until it succeeds. There is no retry cap by
//! default — the cap and backoff are configurable, not guessed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::RegistrationError;
use crate::hub::MessageHub;
use crate::message::ConsumerRegistration;

/// Default pause before re-attempting a queued registration.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(3);

/// A registration waiting for another attempt.
#[derive(Debug)]
pub struct RetryEntry {
    pub registration: ConsumerRegistration,
    /// Attempts made so far, including the initial bootstrap attempt.
    pub attempts: u32,
}

/// Producer half of the retry queue. The registration path and the retry
/// worker share only this channel.
#[derive(Clone)]
pub struct RegistrationRetry {
    tx: mpsc::UnboundedSender<RetryEntry>,
}

impl RegistrationRetry {
    /// Create the retry queue. The receiver goes to [`run_retry_worker`].
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RetryEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a registration for a later attempt. Never drops: the channel
    /// is unbounded and entries without a cap retry indefinitely.
    pub fn enqueue(&self, registration: ConsumerRegistration, attempts: u32) {
        if self
            .tx
            .send(RetryEntry {
                registration,
                attempts,
            })
            .is_err()
        {
            tracing::error!("Registration retry queue is closed; entry dropped");
        }
    }
}

/// Attempt every declared registration once, queueing failures for the
/// retry worker.
pub fn bootstrap_consumers(
    hub: &Arc<MessageHub>,
    registrations: Vec<ConsumerRegistration>,
    retry: &RegistrationRetry,
) {
    for registration in registrations {
        tracing::info!(
            topic = %registration.topic,
            group = %registration.group,
            backend = ?registration.backend,
            handler = registration.handler.name(),
            "Registering declared consumer",
        );
        match hub.register_consumer(registration.clone()) {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(
                    topic = %registration.topic,
                    error = %e,
                    "Consumer registration failed; queued for retry",
                );
                retry.enqueue(registration, 1);
            }
        }
    }
}

/// Drain the retry queue, re-attempting each entry after `backoff`.
///
/// On repeated failure the entry is re-enqueued with its attempt count
/// bumped; when `max_attempts` is `Some(cap)` and the cap is reached, the
/// entry is dropped with an error log. `AlreadyRegistered` counts as
/// success — the registration intent is satisfied.
pub async fn run_retry_worker(
    hub: Arc<MessageHub>,
    retry: RegistrationRetry,
    mut rx: mpsc::UnboundedReceiver<RetryEntry>,
    backoff: Duration,
    max_attempts: Option<u32>,
    cancel: CancellationToken,
) {
    tracing::info!(
        backoff_secs = backoff.as_secs(),
        max_attempts = ?max_attempts,
        "Registration retry worker started",
    );

    loop {
        let entry = tokio::select! {
            _ = cancel.cancelled() => break,
            entry = rx.recv() => match entry {
                Some(entry) => entry,
                None => break,
            },
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(backoff) => {}
        }

        let topic = entry.registration.topic.clone();
        match hub.register_consumer(entry.registration.clone()) {
            Ok(()) => {
                tracing::info!(
                    topic = %topic,
                    attempts = entry.attempts + 1,
                    "Consumer registered after retry",
                );
            }
            Err(RegistrationError::AlreadyRegistered { .. }) => {
                tracing::info!(topic = %topic, "Consumer already registered; retry satisfied");
            }
            Err(e) => {
                let attempts = entry.attempts + 1;
                if let Some(cap) = max_attempts {
                    if attempts >= cap {
                        tracing::error!(
                            topic = %topic,
                            attempts,
                            error = %e,
                            "Consumer registration exhausted its retry cap; dropping",
                        );
                        continue;
                    }
                }
                tracing::warn!(
                    topic = %topic,
                    attempts,
                    error = %e,
                    "Consumer registration failed again; re-queued",
                );
                retry.enqueue(entry.registration, attempts);
            }
        }
    }

    tracing::info!("Registration retry worker stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
