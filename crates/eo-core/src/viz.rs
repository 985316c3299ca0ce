//! Dataset views and the registry handing them out by id

use std::sync::{Arc, Weak};

use ahash::AHashMap;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use uuid::Uuid;

use crate::dataset::Dataset;
use crate::dimensions::{DatasetDimensions, DimensionsConfig};

/// Unique identifier of a dataset view
pub type VizId = Uuid;

/// One view of a dataset, owning its dimension engine.
///
/// The engine is disposed together with the view.
#[derive(Debug)]
pub struct DatasetViz {
    id: VizId,
    dataset: Arc<Dataset>,
    dimensions: DatasetDimensions,
}

impl DatasetViz {
    /// Create a view over `dataset`, using the dimensions of its configuration
    pub fn new(dataset: Arc<Dataset>, init_dimensions: bool, runtime: Handle) -> Self {
        let config = DimensionsConfig::new(dataset.config().dimensions.clone()).with_init_dimensions(init_dimensions);
        Self::with_dimensions(dataset, config, runtime)
    }

    pub fn with_dimensions(dataset: Arc<Dataset>, config: DimensionsConfig, runtime: Handle) -> Self {
        let dimensions = DatasetDimensions::new(config, dataset.clone(), runtime);
        Self {
            id: Uuid::new_v4(),
            dataset,
            dimensions,
        }
    }

    pub fn id(&self) -> VizId {
        self.id
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn dimensions(&self) -> &DatasetDimensions {
        &self.dimensions
    }

    pub fn dispose(&self) {
        self.dimensions.dispose();
    }
}

/// Weak lookup table of live views
#[derive(Default)]
pub struct VizRegistry {
    views: RwLock<AHashMap<VizId, Weak<DatasetViz>>>,
}

impl VizRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, viz: &Arc<DatasetViz>) {
        let mut views = self.views.write();
        views.retain(|_, view| view.strong_count() > 0);
        views.insert(viz.id(), Arc::downgrade(viz));
    }

    pub fn get(&self, id: &VizId) -> Option<Arc<DatasetViz>> {
        self.views.read().get(id).and_then(Weak::upgrade)
    }

    /// Views of one dataset that are still alive
    pub fn views_of(&self, dataset_id: &str) -> Vec<Arc<DatasetViz>> {
        self.views
            .read()
            .values()
            .filter_map(Weak::upgrade)
            .filter(|viz| viz.dataset().id() == dataset_id)
            .collect()
    }

    /// Drop entries of views that no longer exist
    pub fn prune(&self) -> usize {
        let mut views = self.views.write();
        let before = views.len();
        views.retain(|_, view| view.strong_count() > 0);
        before - views.len()
    }

    pub fn len(&self) -> usize {
        self.views.read().values().filter(|view| view.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetConfig;
    use crate::dimensions::DimensionDescriptor;
    use crate::domain::{CategoricalDomain, DimensionValue};

    fn dataset() -> Arc<Dataset> {
        Arc::new(Dataset::new(
            DatasetConfig::new("s2", "Sentinel-2").with_dimension(
                DimensionDescriptor::new("band", "Band").with_domain(CategoricalDomain::from_values(["B02", "B03"])),
            ),
        ))
    }

    #[tokio::test]
    async fn test_registry_holds_views_weakly() {
        let registry = VizRegistry::new();
        let dataset = dataset();

        let viz = Arc::new(DatasetViz::new(dataset.clone(), true, Handle::current()));
        registry.register(&viz);
        viz.dimensions().settled().await;

        let found = registry.get(&viz.id()).unwrap();
        assert_eq!(found.dimensions().value("band"), Some(DimensionValue::from("B02")));
        assert_eq!(registry.views_of("s2").len(), 1);
        drop(found);

        let id = viz.id();
        drop(viz);
        assert!(registry.get(&id).is_none());
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.prune(), 1);
    }

    #[tokio::test]
    async fn test_dropping_view_releases_dataset_subscription() {
        let dataset = dataset();
        let viz = DatasetViz::new(dataset.clone(), false, Handle::current());
        assert_eq!(dataset.subscriber_count(), 1);
        drop(viz);
        assert_eq!(dataset.subscriber_count(), 0);
    }
}
