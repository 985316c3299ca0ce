//! Filter subscriber trait

use super::{DatasetFilters, FilterKey};

/// Trait for components that need to respond to dataset filter changes
pub trait FilterSubscriber: Send + Sync {
    /// Called after an effective change of one of the dataset filters
    fn on_filters_change(&self, change: &FilterKey, filters: &DatasetFilters);
}
