//! Time index over catalogue entries

use chrono::{DateTime, Utc};

/// Sorted start instants of a catalogue, one per entry.
///
/// Positions returned by the lookups are entry positions in the catalogue,
/// which keeps its entries in the same order.
#[derive(Debug, Clone, Default)]
pub struct TimeIndex {
    starts: Vec<i64>,
}

impl TimeIndex {
    /// Build the index from start instants. They must already be sorted.
    pub fn new<I>(starts: I) -> Self
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        let starts: Vec<i64> = starts.into_iter().map(|t| t.timestamp_millis()).collect();
        debug_assert!(starts.windows(2).all(|w| w[0] <= w[1]));
        Self { starts }
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Number of entries starting at or before `t`
    pub fn count_at_or_before(&self, t: DateTime<Utc>) -> usize {
        let t = t.timestamp_millis();
        self.starts.partition_point(|&start| start <= t)
    }

    /// Position of the first entry starting at or after `t`
    pub fn first_at_or_after(&self, t: DateTime<Utc>) -> usize {
        let t = t.timestamp_millis();
        self.starts.partition_point(|&start| start < t)
    }

    /// Position of the last entry starting at or before `t`
    pub fn last_at_or_before(&self, t: DateTime<Utc>) -> Option<usize> {
        self.count_at_or_before(t).checked_sub(1)
    }
}
