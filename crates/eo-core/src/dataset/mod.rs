//! Dataset aggregate: owns the area of interest, the time of interest and the
//! additional filters read by every view built on the dataset

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use crate::dimensions::DimensionDescriptor;
use crate::time_distribution::TimeDistributionProvider;

mod filters;
mod subscriber;

pub use filters::{AoiValue, DatasetFilters, DimensionFilters, FilterKey, TimeOfInterest, TimeRange};
pub use subscriber::FilterSubscriber;

/// Callback fired on every effective time of interest change
pub type ToiUpdateCallback = Arc<dyn Fn(Option<&TimeOfInterest>) + Send + Sync>;

/// Static dataset configuration
#[derive(Clone)]
pub struct DatasetConfig {
    pub id: String,
    pub name: String,
    pub dimensions: Vec<DimensionDescriptor>,
    pub time_distribution: Option<Arc<dyn TimeDistributionProvider>>,
}

impl DatasetConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            dimensions: Vec::new(),
            time_distribution: None,
        }
    }

    pub fn with_dimension(mut self, dimension: DimensionDescriptor) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn with_time_distribution(mut self, provider: Arc<dyn TimeDistributionProvider>) -> Self {
        self.time_distribution = Some(provider);
        self
    }
}

impl fmt::Debug for DatasetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dimensions", &self.dimensions)
            .field("time_distribution", &self.time_distribution.is_some())
            .finish()
    }
}

/// Filter state stored internally
#[derive(Debug, Default)]
struct DatasetState {
    filters: DatasetFilters,
    version: u64,
    disposed: bool,
}

/// The dataset aggregate
pub struct Dataset {
    config: Arc<DatasetConfig>,
    state: RwLock<DatasetState>,
    subscribers: RwLock<Vec<Weak<dyn FilterSubscriber>>>,
    on_toi_update: RwLock<Option<ToiUpdateCallback>>,
}

impl Dataset {
    /// Create a new dataset with empty filters
    pub fn new(config: DatasetConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: RwLock::new(DatasetState::default()),
            subscribers: RwLock::new(Vec::new()),
            on_toi_update: RwLock::new(None),
        }
    }

    /// Create a new dataset with initial filters
    pub fn with_filters(config: DatasetConfig, filters: DatasetFilters) -> Self {
        let dataset = Self::new(config);
        dataset.state.write().filters = filters;
        dataset
    }

    pub fn config(&self) -> &Arc<DatasetConfig> {
        &self.config
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn time_distribution(&self) -> Option<Arc<dyn TimeDistributionProvider>> {
        self.config.time_distribution.clone()
    }

    /// Snapshot of the current filters
    pub fn filters(&self) -> DatasetFilters {
        self.state.read().filters.clone()
    }

    pub fn toi(&self) -> Option<TimeOfInterest> {
        self.state.read().filters.toi
    }

    pub fn aoi(&self) -> Option<AoiValue> {
        self.state.read().filters.aoi.clone()
    }

    /// Incremented on every effective filter change
    pub fn filter_version(&self) -> u64 {
        self.state.read().version
    }

    /// Register the callback fired on effective time of interest changes
    pub fn set_on_toi_update(&self, callback: Option<ToiUpdateCallback>) {
        *self.on_toi_update.write() = callback;
    }

    /// Set the time of interest.
    ///
    /// A value structurally equal to the current one is a no-op. `silent`
    /// suppresses the `on_toi_update` callback, subscribers are still
    /// notified. Returns whether the toi changed.
    pub fn set_toi(&self, toi: Option<TimeOfInterest>, silent: bool) -> bool {
        let filters = {
            let mut state = self.state.write();
            if state.disposed || state.filters.toi == toi {
                return false;
            }
            state.filters.toi = toi;
            state.version += 1;
            state.filters.clone()
        };

        debug!("Dataset {} toi updated to {:?}", self.config.id, toi);

        if !silent {
            // called outside the lock, the callback may replace itself
            let callback = self.on_toi_update.read().clone();
            if let Some(callback) = callback {
                callback(toi.as_ref());
            }
        }

        self.notify_subscribers(&FilterKey::Toi, &filters);
        true
    }

    /// Set the area of interest. Returns whether the aoi changed.
    pub fn set_aoi(&self, aoi: Option<AoiValue>) -> bool {
        let filters = {
            let mut state = self.state.write();
            if state.disposed || state.filters.aoi == aoi {
                return false;
            }
            state.filters.aoi = aoi;
            state.version += 1;
            state.filters.clone()
        };

        self.notify_subscribers(&FilterKey::Aoi, &filters);
        true
    }

    /// Set (or remove, with `None`) one of the additional filters. Returns
    /// whether the filter set changed.
    pub fn set_additional_filter(&self, key: impl Into<String>, value: Option<serde_json::Value>) -> bool {
        let key = key.into();
        let filters = {
            let mut state = self.state.write();
            if state.disposed || state.filters.additional_filters.get(&key) == value.as_ref() {
                return false;
            }
            match value {
                Some(value) => {
                    state.filters.additional_filters.insert(key, value);
                }
                None => {
                    state.filters.additional_filters.remove(&key);
                }
            }
            state.version += 1;
            state.filters.clone()
        };

        self.notify_subscribers(&FilterKey::AdditionalFilters, &filters);
        true
    }

    /// Add a subscriber. Only a weak reference is kept.
    pub fn add_subscriber(&self, subscriber: Weak<dyn FilterSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|weak| weak.strong_count() > 0);
        subscribers.len()
    }

    /// Drop all subscribers and callbacks. Later filter writes are ignored.
    pub fn dispose(&self) {
        self.state.write().disposed = true;
        self.subscribers.write().clear();
        *self.on_toi_update.write() = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.state.read().disposed
    }

    /// Notify all subscribers of a filter change
    fn notify_subscribers(&self, change: &FilterKey, filters: &DatasetFilters) {
        let live: Vec<Arc<dyn FilterSubscriber>> = {
            let mut subscribers = self.subscribers.write();

            // Remove any dead weak references
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };

        for subscriber in live {
            subscriber.on_filters_change(change, filters);
        }
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("config", &self.config)
            .field("filters", &self.state.read().filters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dataset() -> Dataset {
        Dataset::new(DatasetConfig::new("s2-l2a", "Sentinel-2 L2A"))
    }

    #[test]
    fn test_set_toi_same_instant_fires_once() {
        let dataset = dataset();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        dataset.set_on_toi_update(Some(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        let t = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert!(dataset.set_toi(Some(TimeOfInterest::Instant(t)), false));
        // same instant, built independently
        let same = Utc.timestamp_millis_opt(t.timestamp_millis()).unwrap();
        assert!(!dataset.set_toi(Some(TimeOfInterest::Instant(same)), false));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dataset.filter_version(), 1);
    }

    #[test]
    fn test_set_toi_range_equality_and_silent() {
        let dataset = dataset();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        dataset.set_on_toi_update(Some(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        assert!(dataset.set_toi(Some(TimeOfInterest::range(t0, t1)), true));
        assert!(!dataset.set_toi(Some(TimeOfInterest::range(t0, t1)), false));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(dataset.set_toi(None, false));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dataset.toi(), None);
    }

    struct Recorder {
        changes: Mutex<Vec<FilterKey>>,
    }

    impl FilterSubscriber for Recorder {
        fn on_filters_change(&self, change: &FilterKey, _filters: &DatasetFilters) {
            self.changes.lock().push(change.clone());
        }
    }

    #[test]
    fn test_subscribers_are_weak() {
        let dataset = dataset();
        let recorder = Arc::new(Recorder {
            changes: Mutex::new(Vec::new()),
        });
        let weak: Weak<dyn FilterSubscriber> = Arc::downgrade(&recorder) as Weak<dyn FilterSubscriber>;
        dataset.add_subscriber(weak);

        dataset.set_additional_filter("cloudCover", Some(serde_json::json!(20)));
        dataset.set_additional_filter("cloudCover", Some(serde_json::json!(20)));
        dataset.set_aoi(Some(AoiValue::new(geo_types::Point::new(12.5, 41.9))));
        assert_eq!(
            *recorder.changes.lock(),
            vec![FilterKey::AdditionalFilters, FilterKey::Aoi]
        );

        drop(recorder);
        assert_eq!(dataset.subscriber_count(), 0);
    }

    #[test]
    fn test_toi_callback_may_dispose_the_dataset() {
        let dataset = Arc::new(dataset());
        let weak = Arc::downgrade(&dataset);
        dataset.set_on_toi_update(Some(Arc::new(move |_| {
            if let Some(dataset) = weak.upgrade() {
                dataset.dispose();
            }
        })));

        let t = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert!(dataset.set_toi(Some(TimeOfInterest::Instant(t)), false));
        assert!(dataset.is_disposed());
        assert!(!dataset.set_toi(None, false));
    }

    #[test]
    fn test_dispose_ignores_writes() {
        let dataset = dataset();
        dataset.dispose();
        assert!(!dataset.set_additional_filter("platform", Some(serde_json::json!("S2A"))));
        assert!(dataset.filters().additional_filters.is_empty());
    }
}
