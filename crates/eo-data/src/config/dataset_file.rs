//! Dataset configuration files
//!
//! ```json
//! {
//!   "id": "sentinel-2-l2a",
//!   "name": "Sentinel-2 L2A",
//!   "catalogue": "products.csv",
//!   "initDimensions": true,
//!   "toi": { "start": "2024-01-01T00:00:00Z", "end": "2024-01-31T00:00:00Z" },
//!   "dimensions": [
//!     { "id": "time", "name": "Time", "domainFromCatalogue": true },
//!     { "id": "band", "name": "Band", "domain": { "values": [{ "value": "B04" }] } }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use eo_core::dataset::{Dataset, DatasetConfig, DatasetFilters, FilterKey, TimeOfInterest};
use eo_core::dimensions::DimensionDescriptor;
use eo_core::domain::DataDomain;
use eo_core::time_distribution::TimeDistributionProvider;
use eo_core::DomainProvider;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::CatalogueCsvOptions;
use crate::cache::{CachedDomainProvider, DomainCache};
use crate::providers::ExtentDomainProvider;
use crate::sources::ProductCatalogue;
use crate::DataError;

fn default_cache_size() -> usize {
    64
}

/// One dimension of a dataset file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionEntry {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Static domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<DataDomain>,
    /// Resolve the domain from the catalogue time extent
    #[serde(default)]
    pub domain_from_catalogue: bool,
    /// Step of the catalogue derived domain in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_ms: Option<f64>,
    /// Filters re-running the domain provider, the dataset filters when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<FilterKey>>,
}

/// Dataset configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetFile {
    pub id: String,
    pub name: String,

    /// Catalogue CSV, relative to the configuration file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalogue: Option<PathBuf>,

    #[serde(default)]
    pub catalogue_options: CatalogueCsvOptions,

    /// Initialize unset dimensions once their domain is known
    #[serde(default)]
    pub init_dimensions: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toi: Option<TimeOfInterest>,

    /// Initial additional filters, also the catalogue default filters
    #[serde(default)]
    pub additional_filters: BTreeMap<String, Value>,

    #[serde(default)]
    pub dimensions: Vec<DimensionEntry>,

    /// Capacity of the cache shared by catalogue derived domains
    #[serde(default = "default_cache_size")]
    pub domain_cache_size: usize,
}

/// A dataset file with its catalogue loaded
pub struct LoadedDataset {
    pub config: DatasetConfig,
    pub catalogue: Option<Arc<ProductCatalogue>>,
    pub filters: DatasetFilters,
    pub init_dimensions: bool,
}

impl LoadedDataset {
    /// Create the dataset aggregate with the configured initial filters
    pub fn dataset(&self) -> Arc<Dataset> {
        Arc::new(Dataset::with_filters(self.config.clone(), self.filters.clone()))
    }
}

impl DatasetFile {
    /// Read and validate a dataset file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read dataset file {}", path.display()))?;
        let file = Self::from_json(&content).with_context(|| format!("Invalid dataset file {}", path.display()))?;
        Ok(file)
    }

    pub fn from_json(content: &str) -> Result<Self, DataError> {
        let file: DatasetFile = serde_json::from_str(content)?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<(), DataError> {
        let mut seen = HashSet::new();
        for dimension in &self.dimensions {
            if !seen.insert(dimension.id.as_str()) {
                return Err(DataError::Config(format!("duplicate dimension '{}'", dimension.id)));
            }
            if dimension.domain_from_catalogue && dimension.domain.is_some() {
                return Err(DataError::Config(format!(
                    "dimension '{}' has both a static and a catalogue domain",
                    dimension.id
                )));
            }
            if dimension.domain_from_catalogue && self.catalogue.is_none() {
                return Err(DataError::Config(format!(
                    "dimension '{}' needs a catalogue",
                    dimension.id
                )));
            }
        }
        Ok(())
    }

    /// Load the catalogue and build the dataset configuration.
    ///
    /// Relative catalogue paths are resolved against `base_dir`.
    pub fn build(&self, base_dir: &Path) -> Result<LoadedDataset, DataError> {
        let filters = DatasetFilters {
            aoi: None,
            toi: self.toi,
            additional_filters: self.additional_filters.clone(),
        };

        let catalogue = match &self.catalogue {
            Some(path) => {
                let path = if path.is_relative() { base_dir.join(path) } else { path.clone() };
                let catalogue = ProductCatalogue::from_csv(&path, &self.catalogue_options)?;
                catalogue.set_default_filters(Some(filters.clone()));
                Some(Arc::new(catalogue))
            }
            None => None,
        };

        let cache = Arc::new(DomainCache::new(self.domain_cache_size));
        let mut config = DatasetConfig::new(&self.id, &self.name);
        if let Some(catalogue) = &catalogue {
            config = config.with_time_distribution(catalogue.clone());
        }

        for entry in &self.dimensions {
            let mut descriptor = DimensionDescriptor::new(&entry.id, &entry.name);
            if let Some(units) = &entry.units {
                descriptor = descriptor.with_units(units);
            }
            if let Some(description) = &entry.description {
                descriptor = descriptor.with_description(description);
            }
            match &entry.dependencies {
                Some(dependencies) => descriptor = descriptor.with_dependencies(dependencies.clone()),
                // the extent query ignores the toi
                None if entry.domain_from_catalogue => {
                    descriptor = descriptor.with_dependencies(vec![FilterKey::Aoi, FilterKey::AdditionalFilters])
                }
                None => {}
            }

            if let Some(domain) = &entry.domain {
                descriptor = descriptor.with_domain(domain.clone());
            } else if entry.domain_from_catalogue {
                let catalogue = catalogue
                    .clone()
                    .ok_or_else(|| DataError::Config(format!("dimension '{}' needs a catalogue", entry.id)))?;
                let mut provider = ExtentDomainProvider::new(catalogue as Arc<dyn TimeDistributionProvider>);
                if let Some(step) = entry.step_ms {
                    provider = provider.with_step_ms(step);
                }
                let provider: Arc<dyn DomainProvider> = Arc::new(provider);
                descriptor =
                    descriptor.with_domain_provider(CachedDomainProvider::new(provider, cache.clone()));
            }

            config = config.with_dimension(descriptor);
        }

        info!(
            "Built dataset '{}' with {} dimensions",
            self.id,
            config.dimensions.len()
        );

        Ok(LoadedDataset {
            config,
            catalogue,
            filters,
            init_dimensions: self.init_dimensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eo_core::DimensionValue;
    use std::io::Write;

    const CONFIG: &str = r#"{
        "id": "s2-l2a",
        "name": "Sentinel-2 L2A",
        "catalogue": "products.csv",
        "initDimensions": true,
        "toi": { "start": "2024-02-01T00:00:00Z", "end": "2024-02-28T00:00:00Z" },
        "additionalFilters": { "platform": "S2A" },
        "dimensions": [
            { "id": "time", "name": "Time", "domainFromCatalogue": true, "stepMs": 86400000 },
            { "id": "band", "name": "Band", "units": "nm",
              "domain": { "values": [{ "value": "B04", "label": "Red" }, { "value": "B08" }] } },
            { "id": "cloud", "name": "Cloud cover", "domain": { "min": 0, "max": 100 },
              "dependencies": [] }
        ]
    }"#;

    #[test]
    fn test_parse_dataset_file() {
        let file = DatasetFile::from_json(CONFIG).unwrap();
        assert_eq!(file.id, "s2-l2a");
        assert!(file.init_dimensions);
        assert_eq!(file.domain_cache_size, 64);
        assert!(matches!(file.toi, Some(TimeOfInterest::Range(_))));

        let band = &file.dimensions[1];
        assert!(matches!(band.domain, Some(DataDomain::Categorical(ref c)) if c.values.len() == 2));
        let cloud = &file.dimensions[2];
        assert_eq!(
            cloud.domain.as_ref().and_then(|d| d.as_value_domain()).and_then(|d| d.max.clone()),
            Some(DimensionValue::Number(100.0))
        );
        assert_eq!(cloud.dependencies, Some(Vec::new()));
    }

    #[test]
    fn test_invalid_files_are_rejected() {
        let duplicate = r#"{ "id": "a", "name": "A", "dimensions": [
            { "id": "x", "name": "X" }, { "id": "x", "name": "X" } ] }"#;
        assert!(matches!(DatasetFile::from_json(duplicate), Err(DataError::Config(_))));

        let no_catalogue = r#"{ "id": "a", "name": "A", "dimensions": [
            { "id": "time", "name": "Time", "domainFromCatalogue": true } ] }"#;
        assert!(matches!(DatasetFile::from_json(no_catalogue), Err(DataError::Config(_))));

        assert!(matches!(DatasetFile::from_json("{"), Err(DataError::Json(_))));
    }

    #[test]
    fn test_load_and_build() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = std::fs::File::create(dir.path().join("products.csv")).unwrap();
        writeln!(csv, "start,platform").unwrap();
        writeln!(csv, "2024-02-03T10:00:00Z,S2A").unwrap();
        writeln!(csv, "2024-02-08T10:00:00Z,S2B").unwrap();
        let config_path = dir.path().join("dataset.json");
        std::fs::write(&config_path, CONFIG).unwrap();

        let file = DatasetFile::load(&config_path).unwrap();
        let loaded = file.build(dir.path()).unwrap();

        assert_eq!(loaded.config.dimensions.len(), 3);
        assert!(loaded.config.time_distribution.is_some());
        let catalogue = loaded.catalogue.as_ref().unwrap();
        assert_eq!(catalogue.len(), 2);
        assert!(catalogue.default_filters().is_some());

        let dataset = loaded.dataset();
        assert_eq!(dataset.id(), "s2-l2a");
        assert_eq!(
            dataset.filters().additional_filters.get("platform"),
            Some(&serde_json::json!("S2A"))
        );
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = DatasetFile::load("/nonexistent/dataset.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read dataset file"));
    }
}
