//! Time distribution provider contract
//!
//! A per-dataset collaborator answering which time values exist, which item
//! is nearest to a given instant and what the overall time extent is.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::{DatasetFilters, TimeRange};
use crate::error::DimensionResult;

mod nearest;

pub use nearest::{find_nearest_item, NearestItem, NearestItemSource};

/// Restricts a nearest-item search to earlier or later candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchDirection {
    /// Candidates starting at or after the instant
    Forward,
    /// Candidates starting at or before the instant
    Backward,
}

/// Which filters a query runs with
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FilterSelection {
    /// The provider's default filters
    #[default]
    Default,
    /// No filtering at all, ignoring the defaults
    Unfiltered,
    Explicit(DatasetFilters),
}

/// Metadata attached to a distribution item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeDistributionItemData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loading: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

/// A time instant (no `end`) or time range item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeDistributionItem {
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<TimeDistributionItemData>,
}

impl TimeDistributionItem {
    pub fn instant(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: None,
            data: None,
        }
    }

    pub fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: Some(end),
            data: None,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.data.get_or_insert_with(Default::default).count = Some(count);
        self
    }

    /// Last instant covered by the item
    pub fn end_or_start(&self) -> DateTime<Utc> {
        self.end.unwrap_or(self.start)
    }

    /// Distance used by nearest-item searches.
    ///
    /// Directional searches measure from the item start; an undirected search
    /// also counts a range item containing the instant as distance zero.
    /// Returns `None` when the item is excluded by the direction.
    pub fn distance_to(&self, instant: DateTime<Utc>, direction: Option<SearchDirection>) -> Option<Duration> {
        match direction {
            Some(SearchDirection::Forward) => (self.start >= instant).then(|| self.start - instant),
            Some(SearchDirection::Backward) => (self.start <= instant).then(|| instant - self.start),
            None => {
                if self.start <= instant && instant <= self.end_or_start() {
                    Some(Duration::zero())
                } else {
                    Some((self.start - instant).abs())
                }
            }
        }
    }
}

/// Per-dataset time distribution provider
#[async_trait::async_trait]
pub trait TimeDistributionProvider: Send + Sync {
    /// Whether distributions carry per-bucket counts
    fn supports_histograms(&self) -> bool;

    /// Store the filters used when a query does not supply any. Returns
    /// whether the change affects the distribution.
    fn set_default_filters(&self, filters: Option<DatasetFilters>) -> bool;

    /// Overall time coverage of the dataset
    async fn get_time_extent(&self, filters: FilterSelection) -> DimensionResult<Option<TimeDistributionItem>>;

    /// Items covering `range` at the given temporal resolution
    async fn get_time_distribution(
        &self,
        range: TimeRange,
        filters: FilterSelection,
        resolution: Option<Duration>,
    ) -> DimensionResult<Vec<TimeDistributionItem>>;

    /// The item nearest to `instant`
    async fn get_nearest_item(
        &self,
        instant: DateTime<Utc>,
        direction: Option<SearchDirection>,
        filters: FilterSelection,
    ) -> DimensionResult<Option<TimeDistributionItem>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_distance_respects_direction() {
        let t = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
        let before = TimeDistributionItem::instant(t - Duration::days(2));
        let after = TimeDistributionItem::instant(t + Duration::days(1));

        assert_eq!(before.distance_to(t, Some(SearchDirection::Forward)), None);
        assert_eq!(before.distance_to(t, Some(SearchDirection::Backward)), Some(Duration::days(2)));
        assert_eq!(after.distance_to(t, Some(SearchDirection::Backward)), None);
        assert_eq!(after.distance_to(t, None), Some(Duration::days(1)));

        let covering = TimeDistributionItem::range(t - Duration::days(5), t + Duration::days(5));
        assert_eq!(covering.distance_to(t, None), Some(Duration::zero()));
    }
}
