use std::sync::Arc;

use eo_core::dataset::DimensionFilters;
use eo_core::domain::{DataDomain, ValueDomain};
use eo_core::time_distribution::{FilterSelection, TimeDistributionProvider};
use eo_core::{CancellableFuture, DomainProvider};
use tracing::debug;

/// Resolves a temporal value domain from the time extent of a provider under
/// the current filters.
///
/// The time of interest is left out of the query so the domain always spans
/// every matching product.
pub struct ExtentDomainProvider {
    provider: Arc<dyn TimeDistributionProvider>,
    step_ms: Option<f64>,
}

impl ExtentDomainProvider {
    pub fn new(provider: Arc<dyn TimeDistributionProvider>) -> Self {
        Self { provider, step_ms: None }
    }

    pub fn with_step_ms(mut self, step_ms: f64) -> Self {
        self.step_ms = Some(step_ms);
        self
    }
}

impl DomainProvider for ExtentDomainProvider {
    fn resolve(&self, filters: &DimensionFilters) -> CancellableFuture<DataDomain> {
        let mut dataset_filters = filters.dataset_filters();
        dataset_filters.toi = None;

        let provider = self.provider.clone();
        let step_ms = self.step_ms;
        CancellableFuture::abortable(async move {
            let extent = provider
                .get_time_extent(FilterSelection::Explicit(dataset_filters))
                .await?;

            let mut domain = match extent {
                Some(extent) => ValueDomain::bounded(extent.start, extent.end_or_start()),
                None => {
                    debug!("No products match the current filters, domain is unbounded");
                    ValueDomain::default()
                }
            };
            if let Some(step) = step_ms {
                domain = domain.with_step(step);
            }
            Ok(DataDomain::Value(domain))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{CatalogueEntry, ProductCatalogue};
    use chrono::{TimeZone, Utc};
    use eo_core::DimensionValue;

    #[tokio::test]
    async fn test_domain_follows_filters() {
        let t = |d| Utc.with_ymd_and_hms(2023, 8, d, 0, 0, 0).unwrap();
        let catalogue = ProductCatalogue::new(vec![
            CatalogueEntry::new(t(2)).with_attribute("platform", "S1A"),
            CatalogueEntry::new(t(9)).with_attribute("platform", "S1A"),
            CatalogueEntry::new(t(30)).with_attribute("platform", "S1B"),
        ]);
        let provider = ExtentDomainProvider::new(Arc::new(catalogue)).with_step_ms(86_400_000.0);

        let all = provider.resolve(&DimensionFilters::default()).await.unwrap();
        let domain = all.as_value_domain().unwrap();
        assert_eq!(domain.min, Some(DimensionValue::Time(t(2))));
        assert_eq!(domain.max, Some(DimensionValue::Time(t(30))));
        assert_eq!(domain.step, Some(86_400_000.0));

        let mut filters = DimensionFilters::default();
        filters
            .additional_filters
            .insert("platform".into(), serde_json::json!("S1A"));
        let s1a = provider.resolve(&filters).await.unwrap();
        assert_eq!(s1a.as_value_domain().unwrap().max, Some(DimensionValue::Time(t(9))));

        filters
            .additional_filters
            .insert("platform".into(), serde_json::json!("S1C"));
        let none = provider.resolve(&filters).await.unwrap();
        assert_eq!(none, DataDomain::Value(ValueDomain::default()));
    }
}
