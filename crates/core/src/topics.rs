//! Message hub topic names and canonical namespacing.

/// Topic carrying per-poll job progress events.
pub const JOB_PROGRESS_TOPIC: &str = "job-progress";

/// Catalog category for job-related topics.
pub const CATEGORY_JOB: &str = "job";

/// Shared delivery group used by platform consumers.
pub const COMMON_GROUP: &str = "datalift-common";

/// Canonical namespaced topic name as stored in the whitelist.
pub fn inner_topic_name(category: &str, topic: &str) -> String {
    format!("datalift:{category}:{topic}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_is_namespaced() {
        assert_eq!(
            inner_topic_name(CATEGORY_JOB, JOB_PROGRESS_TOPIC),
            "datalift:job:job-progress"
        );
    }

    #[test]
    fn canonical_name_preserves_inputs() {
        assert_eq!(inner_topic_name("ops", "alerts"), "datalift:ops:alerts");
    }
}
