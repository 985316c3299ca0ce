//! In-memory product catalogue answering time distribution queries

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use eo_core::dataset::{DatasetFilters, TimeRange};
use eo_core::time_distribution::{
    FilterSelection, SearchDirection, TimeDistributionItem, TimeDistributionProvider,
};
use eo_core::DimensionResult;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::index::TimeIndex;

/// One acquisition (or product) listed in a catalogue
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueEntry {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    /// Number of items the entry stands for
    pub count: Option<u64>,
    /// Attributes matched against additional filters
    pub attributes: BTreeMap<String, String>,
}

impl CatalogueEntry {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: None,
            count: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    fn end_or_start(&self) -> DateTime<Utc> {
        self.end.unwrap_or(self.start)
    }

    fn to_item(&self) -> TimeDistributionItem {
        let item = match self.end {
            Some(end) => TimeDistributionItem::range(self.start, end),
            None => TimeDistributionItem::instant(self.start),
        };
        match self.count {
            Some(count) => item.with_count(count),
            None => item,
        }
    }

    /// Whether the entry passes every additional filter.
    ///
    /// A `null` filter value is ignored, an array matches any of its
    /// elements and other values are compared in their string form.
    fn matches(&self, filters: Option<&DatasetFilters>) -> bool {
        let Some(filters) = filters else {
            return true;
        };

        filters.additional_filters.iter().all(|(key, expected)| {
            let actual = self.attributes.get(key);
            match expected {
                Value::Null => true,
                Value::Array(options) => options.is_empty() || options.iter().any(|v| attribute_matches(actual, v)),
                other => attribute_matches(actual, other),
            }
        })
    }
}

fn attribute_matches(actual: Option<&String>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match expected {
        Value::String(s) => actual == s,
        Value::Number(_) | Value::Bool(_) => *actual == expected.to_string(),
        _ => false,
    }
}

/// Time sorted list of catalogue entries
pub struct ProductCatalogue {
    entries: Vec<CatalogueEntry>,
    index: TimeIndex,
    default_filters: RwLock<Option<DatasetFilters>>,
}

impl ProductCatalogue {
    pub fn new(mut entries: Vec<CatalogueEntry>) -> Self {
        entries.sort_by_key(|entry| entry.start);
        let index = TimeIndex::new(entries.iter().map(|entry| entry.start));
        Self {
            entries,
            index,
            default_filters: RwLock::new(None),
        }
    }

    pub fn entries(&self) -> &[CatalogueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn default_filters(&self) -> Option<DatasetFilters> {
        self.default_filters.read().clone()
    }

    fn resolve_filters(&self, selection: FilterSelection) -> Option<DatasetFilters> {
        match selection {
            FilterSelection::Default => self.default_filters(),
            FilterSelection::Unfiltered => None,
            FilterSelection::Explicit(filters) => Some(filters),
        }
    }

    fn matching<'a>(&'a self, filters: &'a Option<DatasetFilters>) -> impl Iterator<Item = &'a CatalogueEntry> + 'a {
        self.entries.iter().filter(move |entry| entry.matches(filters.as_ref()))
    }

    /// Bucket the entries overlapping `range` into slots of `resolution`,
    /// aligned on the range start
    fn histogram<'a>(
        entries: impl Iterator<Item = &'a CatalogueEntry>,
        range: &TimeRange,
        resolution: Duration,
    ) -> Vec<TimeDistributionItem> {
        let step = resolution.num_milliseconds().max(1);
        let mut buckets: BTreeMap<i64, u64> = BTreeMap::new();

        for entry in entries {
            let offset = (entry.start - range.start).num_milliseconds().max(0);
            *buckets.entry(offset / step).or_default() += entry.count.unwrap_or(1);
        }

        buckets
            .into_iter()
            .map(|(slot, count)| {
                let start = range.start + Duration::milliseconds(slot * step);
                let end = (start + Duration::milliseconds(step)).min(range.end);
                TimeDistributionItem::range(start, end).with_count(count)
            })
            .collect()
    }
}

impl std::fmt::Debug for ProductCatalogue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductCatalogue")
            .field("entries", &self.entries.len())
            .field("default_filters", &*self.default_filters.read())
            .finish()
    }
}

#[async_trait]
impl TimeDistributionProvider for ProductCatalogue {
    fn supports_histograms(&self) -> bool {
        true
    }

    fn set_default_filters(&self, filters: Option<DatasetFilters>) -> bool {
        let mut current = self.default_filters.write();
        let before = current.as_ref().map(|f| &f.additional_filters);
        let after = filters.as_ref().map(|f| &f.additional_filters);
        let affects_distribution = before != after;
        *current = filters;
        affects_distribution
    }

    async fn get_time_extent(&self, filters: FilterSelection) -> DimensionResult<Option<TimeDistributionItem>> {
        let filters = self.resolve_filters(filters);
        let mut extent: Option<(DateTime<Utc>, DateTime<Utc>, u64)> = None;

        for entry in self.matching(&filters) {
            let count = entry.count.unwrap_or(1);
            extent = Some(match extent {
                None => (entry.start, entry.end_or_start(), count),
                Some((start, end, total)) => (start.min(entry.start), end.max(entry.end_or_start()), total + count),
            });
        }

        Ok(extent.map(|(start, end, count)| TimeDistributionItem::range(start, end).with_count(count)))
    }

    async fn get_time_distribution(
        &self,
        range: TimeRange,
        filters: FilterSelection,
        resolution: Option<Duration>,
    ) -> DimensionResult<Vec<TimeDistributionItem>> {
        let filters = self.resolve_filters(filters);
        let upper = self.index.count_at_or_before(range.end);
        let overlapping = self.entries[..upper]
            .iter()
            .filter(|entry| entry.end_or_start() >= range.start)
            .filter(|entry| entry.matches(filters.as_ref()));

        let items = match resolution {
            Some(resolution) => Self::histogram(overlapping, &range, resolution),
            None => overlapping.map(CatalogueEntry::to_item).collect(),
        };
        debug!("Time distribution of {} items for {:?}", items.len(), range);
        Ok(items)
    }

    async fn get_nearest_item(
        &self,
        instant: DateTime<Utc>,
        direction: Option<SearchDirection>,
        filters: FilterSelection,
    ) -> DimensionResult<Option<TimeDistributionItem>> {
        let filters = self.resolve_filters(filters);
        let filters = filters.as_ref();

        let nearest = match direction {
            Some(SearchDirection::Backward) => {
                let upper = self.index.count_at_or_before(instant);
                self.entries[..upper].iter().rev().find(|entry| entry.matches(filters))
            }
            Some(SearchDirection::Forward) => {
                let lower = self.index.first_at_or_after(instant);
                self.entries[lower..].iter().find(|entry| entry.matches(filters))
            }
            None => self
                .entries
                .iter()
                .filter(|entry| entry.matches(filters))
                .filter_map(|entry| entry.to_item().distance_to(instant, None).map(|d| (d, entry)))
                .min_by_key(|(d, _)| *d)
                .map(|(_, entry)| entry),
        };

        Ok(nearest.map(CatalogueEntry::to_item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, 10, 0, 0).unwrap()
    }

    fn catalogue() -> ProductCatalogue {
        ProductCatalogue::new(vec![
            CatalogueEntry::new(day(12)).with_attribute("platform", "S2B").with_count(3),
            CatalogueEntry::new(day(3)).with_attribute("platform", "S2A").with_count(2),
            CatalogueEntry::new(day(7)).with_attribute("platform", "S2B"),
            CatalogueEntry::new(day(20))
                .with_end(day(25))
                .with_attribute("platform", "S2A"),
        ])
    }

    fn platform(value: Value) -> DatasetFilters {
        let mut filters = DatasetFilters::default();
        filters.additional_filters.insert("platform".into(), value);
        filters
    }

    #[tokio::test]
    async fn test_nearest_per_direction() {
        let catalogue = catalogue();

        let backward = catalogue
            .get_nearest_item(day(11), Some(SearchDirection::Backward), FilterSelection::Default)
            .await
            .unwrap();
        assert_eq!(backward.unwrap().start, day(7));

        let forward = catalogue
            .get_nearest_item(day(8), Some(SearchDirection::Forward), FilterSelection::Default)
            .await
            .unwrap();
        assert_eq!(forward.unwrap().start, day(12));

        let inside_range = catalogue
            .get_nearest_item(day(24), None, FilterSelection::Default)
            .await
            .unwrap();
        assert_eq!(inside_range.unwrap().start, day(20));

        let none_before = catalogue
            .get_nearest_item(day(1), Some(SearchDirection::Backward), FilterSelection::Default)
            .await
            .unwrap();
        assert!(none_before.is_none());
    }

    #[tokio::test]
    async fn test_default_filters_apply_unless_overridden() {
        let catalogue = catalogue();
        assert!(catalogue.set_default_filters(Some(platform(json!("S2A")))));
        assert!(!catalogue.set_default_filters(Some(platform(json!("S2A")))));

        let nearest = catalogue
            .get_nearest_item(day(11), Some(SearchDirection::Backward), FilterSelection::Default)
            .await
            .unwrap();
        assert_eq!(nearest.unwrap().start, day(3));

        let unfiltered = catalogue
            .get_nearest_item(day(11), Some(SearchDirection::Backward), FilterSelection::Unfiltered)
            .await
            .unwrap();
        assert_eq!(unfiltered.unwrap().start, day(7));

        let any_of = catalogue
            .get_nearest_item(
                day(11),
                Some(SearchDirection::Backward),
                FilterSelection::Explicit(platform(json!(["S2B", "S2C"]))),
            )
            .await
            .unwrap();
        assert_eq!(any_of.unwrap().start, day(7));
    }

    #[tokio::test]
    async fn test_extent() {
        let catalogue = catalogue();
        let extent = catalogue.get_time_extent(FilterSelection::Default).await.unwrap().unwrap();
        assert_eq!(extent.start, day(3));
        assert_eq!(extent.end, Some(day(25)));
        assert_eq!(extent.data.unwrap().count, Some(7));

        let extent = catalogue
            .get_time_extent(FilterSelection::Explicit(platform(json!("S2B"))))
            .await
            .unwrap()
            .unwrap();
        assert_eq!((extent.start, extent.end), (day(7), Some(day(12))));

        let empty = ProductCatalogue::new(Vec::new());
        assert!(empty.get_time_extent(FilterSelection::Default).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_distribution_and_histogram() {
        let catalogue = catalogue();
        let range = TimeRange::new(day(1), day(15));

        let items = catalogue
            .get_time_distribution(range, FilterSelection::Default, None)
            .await
            .unwrap();
        let starts: Vec<_> = items.iter().map(|item| item.start).collect();
        assert_eq!(starts, vec![day(3), day(7), day(12)]);

        let weekly = catalogue
            .get_time_distribution(range, FilterSelection::Default, Some(Duration::days(7)))
            .await
            .unwrap();
        let counts: Vec<_> = weekly
            .iter()
            .map(|item| item.data.as_ref().and_then(|d| d.count).unwrap())
            .collect();
        // [1..8) holds day 3 (2) and day 7 (1), [8..15) holds day 12 (3)
        assert_eq!(counts, vec![3, 3]);
        assert_eq!(weekly[0].start, day(1));
    }
}
