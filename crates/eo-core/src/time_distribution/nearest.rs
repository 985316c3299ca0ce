//! Cross-dataset nearest item resolution

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::warn;

use super::{FilterSelection, SearchDirection, TimeDistributionItem, TimeDistributionProvider};

/// One dataset taking part in a cross-dataset search
#[derive(Clone)]
pub struct NearestItemSource {
    pub dataset_id: String,
    pub provider: Arc<dyn TimeDistributionProvider>,
}

/// The globally nearest item and the dataset it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct NearestItem {
    pub dataset_id: String,
    pub item: TimeDistributionItem,
}

/// Find the item nearest to `instant` across several datasets.
///
/// All providers are queried concurrently with their default filters. A
/// failing provider is skipped. On equal distance the dataset listed first
/// wins.
pub async fn find_nearest_item(
    sources: &[NearestItemSource],
    instant: DateTime<Utc>,
    direction: Option<SearchDirection>,
) -> Option<NearestItem> {
    let lookups = sources
        .iter()
        .map(|source| source.provider.get_nearest_item(instant, direction, FilterSelection::Default));
    let results = join_all(lookups).await;

    let mut best: Option<(chrono::Duration, NearestItem)> = None;
    for (source, result) in sources.iter().zip(results) {
        let item = match result {
            Ok(Some(item)) => item,
            Ok(None) => continue,
            Err(e) => {
                warn!("Nearest item lookup failed for dataset {}: {}", source.dataset_id, e);
                continue;
            }
        };

        let Some(distance) = item.distance_to(instant, direction) else {
            continue;
        };

        if best.as_ref().map_or(true, |(d, _)| distance < *d) {
            best = Some((
                distance,
                NearestItem {
                    dataset_id: source.dataset_id.clone(),
                    item,
                },
            ));
        }
    }

    best.map(|(_, nearest)| nearest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetFilters, TimeRange};
    use crate::error::{DimensionError, DimensionResult};
    use chrono::{Duration, TimeZone};

    struct FixedItems {
        items: Vec<TimeDistributionItem>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl TimeDistributionProvider for FixedItems {
        fn supports_histograms(&self) -> bool {
            false
        }

        fn set_default_filters(&self, _filters: Option<DatasetFilters>) -> bool {
            false
        }

        async fn get_time_extent(&self, _filters: FilterSelection) -> DimensionResult<Option<TimeDistributionItem>> {
            Ok(None)
        }

        async fn get_time_distribution(
            &self,
            _range: TimeRange,
            _filters: FilterSelection,
            _resolution: Option<Duration>,
        ) -> DimensionResult<Vec<TimeDistributionItem>> {
            Ok(self.items.clone())
        }

        async fn get_nearest_item(
            &self,
            instant: DateTime<Utc>,
            direction: Option<SearchDirection>,
            _filters: FilterSelection,
        ) -> DimensionResult<Option<TimeDistributionItem>> {
            if self.fail {
                return Err(DimensionError::TimeDistribution("offline".into()));
            }
            Ok(self
                .items
                .iter()
                .filter_map(|item| item.distance_to(instant, direction).map(|d| (d, item)))
                .min_by_key(|(d, _)| *d)
                .map(|(_, item)| item.clone()))
        }
    }

    fn source(id: &str, items: Vec<TimeDistributionItem>, fail: bool) -> NearestItemSource {
        NearestItemSource {
            dataset_id: id.to_string(),
            provider: Arc::new(FixedItems { items, fail }),
        }
    }

    #[tokio::test]
    async fn test_globally_nearest_item() {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let sources = vec![
            source("s1", vec![TimeDistributionItem::instant(t - Duration::hours(5))], false),
            source("s2", vec![TimeDistributionItem::instant(t - Duration::hours(2))], false),
            source("broken", Vec::new(), true),
            source("s3", vec![TimeDistributionItem::instant(t + Duration::hours(1))], false),
        ];

        let nearest = find_nearest_item(&sources, t, None).await.unwrap();
        assert_eq!(nearest.dataset_id, "s3");

        let nearest = find_nearest_item(&sources, t, Some(SearchDirection::Backward)).await.unwrap();
        assert_eq!(nearest.dataset_id, "s2");
        assert_eq!(nearest.item.start, t - Duration::hours(2));
    }

    #[tokio::test]
    async fn test_ties_resolve_to_first_source() {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let sources = vec![
            source("a", vec![TimeDistributionItem::instant(t + Duration::hours(3))], false),
            source("b", vec![TimeDistributionItem::instant(t - Duration::hours(3))], false),
        ];
        let nearest = find_nearest_item(&sources, t, None).await.unwrap();
        assert_eq!(nearest.dataset_id, "a");

        assert!(find_nearest_item(&[], t, None).await.is_none());
    }
}
