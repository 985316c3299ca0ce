//! Core functionality for dataset dimension resolution
//!
//! This crate provides the dimension state engine keeping selected values and
//! ranges consistent with asynchronously resolved domains, the dataset
//! aggregate owning the shared filters, and the time distribution contract.

pub mod dataset;
pub mod dimensions;
pub mod domain;
pub mod error;
pub mod request;
pub mod time_distribution;
pub mod viz;

// Re-export commonly used types
pub use dataset::{
    AoiValue, Dataset, DatasetConfig, DatasetFilters, DimensionFilters, FilterKey, FilterSubscriber, TimeOfInterest,
    TimeRange,
};
pub use dimensions::{
    clamp_range, DatasetDimensions, DimensionDescriptor, DimensionDomainSpec, DimensionsConfig, DimensionsSnapshot,
    DomainProvider, TIME_DIMENSION_ID,
};
pub use domain::{CategoricalDomain, CategoricalDomainItem, DataDomain, DimensionRange, DimensionValue, ValueDomain};
pub use error::{DimensionError, DimensionResult};
pub use request::{CancelHandle, CancellableFuture, PendingRequest};
pub use time_distribution::{
    find_nearest_item, FilterSelection, SearchDirection, TimeDistributionItem, TimeDistributionProvider,
};
pub use viz::{DatasetViz, VizId, VizRegistry};
