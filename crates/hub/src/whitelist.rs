//! Topic whitelist and its periodic reloader.
//!
//! The whitelist holds canonical namespaced topic names rebuilt wholesale
//! from the persisted catalog. Readers always observe either the previous
//! complete set or the new complete set, never a partial one.

use std::collections::HashSet;
use std::sync::RwLock;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use datalift_core::topics::inner_topic_name;
use datalift_db::repositories::TopicRepo;

/// A whitelist refresh failed; the stale set stays in effect.
#[derive(Debug, thiserror::Error)]
#[error("whitelist reload failed: {0}")]
pub struct ReloadError(#[from] sqlx::Error);

/// Shared set of currently-valid canonical topic names.
#[derive(Default)]
pub struct TopicWhitelist {
    topics: RwLock<HashSet<String>>,
}

impl TopicWhitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a canonical name is whitelisted.
    pub fn contains(&self, canonical: &str) -> bool {
        self.topics
            .read()
            .expect("whitelist poisoned")
            .contains(canonical)
    }

    /// Whether any whitelisted canonical name ends in the raw topic,
    /// regardless of category.
    pub fn contains_topic(&self, topic: &str) -> bool {
        let suffix = format!(":{topic}");
        self.topics
            .read()
            .expect("whitelist poisoned")
            .iter()
            .any(|canonical| canonical.ends_with(&suffix))
    }

    pub fn len(&self) -> usize {
        self.topics.read().expect("whitelist poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap in a complete replacement set under a single write lock.
    pub fn replace(&self, next: HashSet<String>) {
        let mut topics = self.topics.write().expect("whitelist poisoned");
        *topics = next;
    }
}

/// Run the whitelist reload loop: once at startup, then every `period`,
/// until cancelled.
pub async fn run_reloader(
    pool: PgPool,
    whitelist: std::sync::Arc<TopicWhitelist>,
    period: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(period_secs = period.as_secs(), "Topic whitelist reloader started");

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Topic whitelist reloader stopping");
                break;
            }
            _ = interval.tick() => {
                match reload(&pool, &whitelist).await {
                    Ok(count) => {
                        tracing::debug!(topics = count, "Topic whitelist refreshed");
                    }
                    Err(e) => {
                        // Keep the stale set until the next successful cycle.
                        tracing::error!(error = %e, "Topic whitelist reload failed");
                    }
                }
            }
        }
    }
}

/// One reload cycle: read the active catalog, canonicalize, swap.
///
/// An empty catalog keeps the previous set: a transfer platform always
/// has at least its seed topics, so an empty read is treated as a
/// misconfiguration rather than a directive to blank the whitelist.
async fn reload(
    pool: &PgPool,
    whitelist: &TopicWhitelist,
) -> Result<usize, ReloadError> {
    let rows = TopicRepo::list_active(pool).await?;

    if rows.is_empty() {
        tracing::warn!("Topic catalog is empty; keeping previous whitelist");
        return Ok(whitelist.len());
    }

    let next: HashSet<String> = rows
        .iter()
        .map(|row| inner_topic_name(&row.category, &row.topic))
        .collect();
    let count = next.len();
    whitelist.replace(next);
    Ok(count)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn replace_swaps_the_whole_set() {
        let whitelist = TopicWhitelist::new();
        whitelist.replace(set(&["datalift:job:job-progress"]));
        assert!(whitelist.contains("datalift:job:job-progress"));

        whitelist.replace(set(&["datalift:ops:alerts"]));
        assert!(!whitelist.contains("datalift:job:job-progress"));
        assert!(whitelist.contains("datalift:ops:alerts"));
    }

    #[test]
    fn contains_topic_matches_any_category() {
        let whitelist = TopicWhitelist::new();
        whitelist.replace(set(&["datalift:job:job-progress", "datalift:ops:alerts"]));

        assert!(whitelist.contains_topic("job-progress"));
        assert!(whitelist.contains_topic("alerts"));
        assert!(!whitelist.contains_topic("progress"));
    }

    #[test]
    fn concurrent_readers_never_observe_an_empty_set() {
        let whitelist = Arc::new(TopicWhitelist::new());
        whitelist.replace(set(&["datalift:job:a"]));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let whitelist = Arc::clone(&whitelist);
                std::thread::spawn(move || {
                    for _ in 0..5_000 {
                        assert!(!whitelist.is_empty(), "reader saw an empty whitelist");
                    }
                })
            })
            .collect();

        for round in 0..5_000 {
            let name = format!("datalift:job:{round}");
            whitelist.replace(set(&[&name]));
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
