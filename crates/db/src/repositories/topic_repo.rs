//! Repository for the `hub_topics` catalog.

use sqlx::PgPool;

use crate::models::topic::HubTopic;

/// Read access to the topic catalog consumed by the whitelist reloader.
pub struct TopicRepo;

impl TopicRepo {
    /// All topics not marked deleted.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<HubTopic>, sqlx::Error> {
        sqlx::query_as::<_, HubTopic>(
            "SELECT topic, category FROM hub_topics WHERE is_deleted = FALSE ORDER BY topic",
        )
        .fetch_all(pool)
        .await
    }
}
