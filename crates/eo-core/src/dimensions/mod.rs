//! Dataset dimensions: descriptors, domain providers and the per-view
//! dimension state engine

use std::fmt;
use std::sync::Arc;

use crate::dataset::{DimensionFilters, FilterKey};
use crate::domain::DataDomain;
use crate::request::CancellableFuture;

mod clamp;
mod engine;
mod snapshot;

pub use clamp::{clamp_range, reconcile_value, ValueCorrection};
pub use engine::DatasetDimensions;
pub use snapshot::DimensionsSnapshot;

/// Reserved id of the time dimension
pub const TIME_DIMENSION_ID: &str = "time";

/// Computes the domain of a dimension from the current filters
pub trait DomainProvider: Send + Sync {
    fn resolve(&self, filters: &DimensionFilters) -> CancellableFuture<DataDomain>;
}

impl<F> DomainProvider for F
where
    F: Fn(&DimensionFilters) -> CancellableFuture<DataDomain> + Send + Sync,
{
    fn resolve(&self, filters: &DimensionFilters) -> CancellableFuture<DataDomain> {
        self(filters)
    }
}

/// Where the domain of a dimension comes from
#[derive(Clone)]
pub enum DimensionDomainSpec {
    Static(DataDomain),
    Provider(Arc<dyn DomainProvider>),
}

impl fmt::Debug for DimensionDomainSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimensionDomainSpec::Static(domain) => f.debug_tuple("Static").field(domain).finish(),
            DimensionDomainSpec::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Static configuration of a dimension
#[derive(Debug, Clone)]
pub struct DimensionDescriptor {
    pub id: String,
    pub name: String,
    pub domain: Option<DimensionDomainSpec>,
    pub units: Option<String>,
    pub description: Option<String>,
    /// Filters whose change re-runs the domain provider
    pub dependencies: Vec<FilterKey>,
}

impl DimensionDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            domain: None,
            units: None,
            description: None,
            dependencies: FilterKey::dataset_defaults(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<DataDomain>) -> Self {
        self.domain = Some(DimensionDomainSpec::Static(domain.into()));
        self
    }

    pub fn with_domain_provider(mut self, provider: impl DomainProvider + 'static) -> Self {
        self.domain = Some(DimensionDomainSpec::Provider(Arc::new(provider)));
        self
    }

    pub fn with_shared_domain_provider(mut self, provider: Arc<dyn DomainProvider>) -> Self {
        self.domain = Some(DimensionDomainSpec::Provider(provider));
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<FilterKey>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn is_time(&self) -> bool {
        self.id == TIME_DIMENSION_ID
    }

    fn provider(&self) -> Option<&Arc<dyn DomainProvider>> {
        match &self.domain {
            Some(DimensionDomainSpec::Provider(provider)) => Some(provider),
            _ => None,
        }
    }
}

/// Engine construction parameters
#[derive(Debug, Clone, Default)]
pub struct DimensionsConfig {
    pub dimensions: Vec<DimensionDescriptor>,
    /// Initialize unset dimensions from the toi or their domain
    pub init_dimensions: bool,
}

impl DimensionsConfig {
    pub fn new(dimensions: Vec<DimensionDescriptor>) -> Self {
        Self {
            dimensions,
            init_dimensions: false,
        }
    }

    pub fn with_init_dimensions(mut self, init: bool) -> Self {
        self.init_dimensions = init;
        self
    }
}
