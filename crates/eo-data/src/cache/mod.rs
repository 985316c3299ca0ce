//! Domain caching layer

use std::sync::Arc;

use ahash::AHashMap;
use eo_core::dataset::DimensionFilters;
use eo_core::domain::DataDomain;
use eo_core::{CancellableFuture, DomainProvider};
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Cached domains and their access order
struct CacheState {
    domains: AHashMap<String, DataDomain>,
    /// Least recently used first
    access_order: Vec<String>,
}

/// Bounded cache of resolved domains keyed by the serialized filter view
pub struct DomainCache {
    state: RwLock<CacheState>,
    max_entries: usize,
}

impl DomainCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: RwLock::new(CacheState {
                domains: AHashMap::new(),
                access_order: Vec::new(),
            }),
            max_entries: max_entries.max(1),
        }
    }

    /// Cache key of a filter view
    pub fn key(filters: &DimensionFilters) -> Option<String> {
        match serde_json::to_string(filters) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Filters cannot be used as a cache key: {}", e);
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<DataDomain> {
        let mut state = self.state.write();
        let domain = state.domains.get(key).cloned()?;
        if let Some(pos) = state.access_order.iter().position(|k| k == key) {
            let key = state.access_order.remove(pos);
            state.access_order.push(key);
        }
        Some(domain)
    }

    pub fn put(&self, key: String, domain: DataDomain) {
        let mut state = self.state.write();

        if state.domains.contains_key(&key) {
            state.access_order.retain(|k| k != &key);
        } else if state.domains.len() >= self.max_entries && !state.access_order.is_empty() {
            // LRU eviction
            let evicted = state.access_order.remove(0);
            state.domains.remove(&evicted);
        }

        state.access_order.push(key.clone());
        state.domains.insert(key, domain);
    }

    pub fn len(&self) -> usize {
        self.state.read().domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.domains.clear();
        state.access_order.clear();
    }
}

/// Domain provider answering repeated filter views from a [`DomainCache`]
pub struct CachedDomainProvider {
    inner: Arc<dyn DomainProvider>,
    cache: Arc<DomainCache>,
}

impl CachedDomainProvider {
    pub fn new(inner: Arc<dyn DomainProvider>, cache: Arc<DomainCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<DomainCache> {
        &self.cache
    }
}

impl DomainProvider for CachedDomainProvider {
    fn resolve(&self, filters: &DimensionFilters) -> CancellableFuture<DataDomain> {
        let Some(key) = DomainCache::key(filters) else {
            return self.inner.resolve(filters);
        };

        if let Some(domain) = self.cache.get(&key) {
            debug!("Domain cache hit");
            return CancellableFuture::ready(domain);
        }

        let cache = self.cache.clone();
        self.inner
            .resolve(filters)
            .on_resolved(move |domain| cache.put(key, domain.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eo_core::domain::{CategoricalDomain, ValueDomain};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_lru_eviction() {
        let cache = DomainCache::new(2);
        cache.put("a".into(), ValueDomain::bounded(0.0, 1.0).into());
        cache.put("b".into(), ValueDomain::bounded(0.0, 2.0).into());
        assert!(cache.get("a").is_some());

        cache.put("c".into(), ValueDomain::bounded(0.0, 3.0).into());
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[tokio::test]
    async fn test_cached_provider_resolves_once_per_filter_view() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let inner: Arc<dyn DomainProvider> = Arc::new(move |filters: &DimensionFilters| {
            counter.fetch_add(1, Ordering::SeqCst);
            let values = if filters.variable.is_some() { vec!["B04", "B08"] } else { vec!["B04"] };
            CancellableFuture::ready(DataDomain::Categorical(CategoricalDomain::from_values(values)))
        });
        let provider = CachedDomainProvider::new(inner, Arc::new(DomainCache::new(8)));

        let plain = DimensionFilters::default();
        let ndvi = DimensionFilters {
            variable: Some("ndvi".into()),
            ..Default::default()
        };

        let first = provider.resolve(&plain).await.unwrap();
        let second = provider.resolve(&plain).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        provider.resolve(&ndvi).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.cache().len(), 2);
    }
}
