//! Transfer metrics and per-run count aggregation.

use serde::{Deserialize, Serialize};

/// Mutable metrics snapshot owned by one run's execution unit.
///
/// Updated on every poll of the external transfer engine; the final
/// snapshot is what the run reports at completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferMetrics {
    pub read_records: i64,
    /// Effective writes: raw writes minus error records.
    pub write_records: i64,
    pub error_records: i64,
    pub write_bytes: i64,
    /// Incremental cursor high-water mark captured for this run.
    pub cursor_value: Option<String>,
}

/// Per-table accumulator scoped to one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCount {
    pub all_count: i64,
    pub append_count: i64,
    pub filter_count: i64,
}

impl ExecCount {
    /// Add another accumulator into this one, field by field.
    pub fn merge(&mut self, other: &ExecCount) {
        self.all_count += other.all_count;
        self.append_count += other.append_count;
        self.filter_count += other.filter_count;
    }
}

/// Fold per-table entries into a single totals record.
///
/// Addition is associative and commutative, so the totals are the same
/// regardless of the order tables are merged in.
pub fn sum_counts<'a, I>(counts: I) -> ExecCount
where
    I: IntoIterator<Item = &'a ExecCount>,
{
    let mut total = ExecCount::default();
    for count in counts {
        total.merge(count);
    }
    total
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
