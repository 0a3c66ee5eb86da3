//! Row types for the `hub_topics` catalog.

use sqlx::FromRow;

/// An active topic in the message hub catalog.
#[derive(Debug, Clone, FromRow)]
pub struct HubTopic {
    pub topic: String,
    pub category: String,
}
