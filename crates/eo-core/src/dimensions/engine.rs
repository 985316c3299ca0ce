//! Dimension state engine
//!
//! Keeps the selected values and ranges of every dimension of a dataset view
//! consistent with the most recently resolved domains, for static domains as
//! well as asynchronous, filter dependent domain providers.

use std::future::Future;
use std::sync::{Arc, Weak};

use ahash::AHashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::clamp::{clamp_range, reconcile_value, ValueCorrection};
use super::snapshot::{decode_snapshot, encode_snapshot, DimensionsSnapshot};
use super::{DimensionDescriptor, DimensionDomainSpec, DimensionsConfig, TIME_DIMENSION_ID};
use crate::dataset::{Dataset, DatasetFilters, DimensionFilters, FilterKey, FilterSubscriber, TimeOfInterest};
use crate::domain::{DataDomain, DimensionRange, DimensionValue};
use crate::error::{DimensionError, DimensionResult};
use crate::request::{PendingRequest, RequestSettler};
use crate::time_distribution::{FilterSelection, SearchDirection};

/// Dimension state stored internally
#[derive(Debug, Default)]
struct DimensionsState {
    values: AHashMap<String, DimensionValue>,
    ranges: AHashMap<String, DimensionRange>,
    domains: AHashMap<String, Option<DataDomain>>,
    domain_requests: AHashMap<String, PendingRequest<DataDomain>>,
    domain_settlers: AHashMap<String, Arc<RequestSettler<DataDomain>>>,
    /// Latest range write per dimension, older clamp results are dropped
    range_tickets: AHashMap<String, u64>,
    variable: Option<String>,
    next_request_id: u64,
    next_ticket: u64,
    disposed: bool,
}

impl DimensionsState {
    fn issue_ticket(&mut self, id: &str) -> u64 {
        self.next_ticket += 1;
        self.range_tickets.insert(id.to_string(), self.next_ticket);
        self.next_ticket
    }

    fn has_pending_request(&self, id: &str) -> bool {
        self.domain_requests.get(id).map_or(false, PendingRequest::is_pending)
    }

    fn resolved_domain(&self, id: &str) -> Option<DataDomain> {
        self.domains.get(id).cloned().flatten()
    }
}

/// Write scheduled during a reconciliation pass, applied once the pass is over
#[derive(Debug)]
enum Correction {
    SetValue(String, DimensionValue),
    UnsetValue(String),
    SetRange(String, DimensionRange),
    UnsetRange(String),
    InitTime(String, Option<DataDomain>),
}

struct DimensionsInner {
    dataset: Arc<Dataset>,
    descriptors: Vec<DimensionDescriptor>,
    init_dimensions: bool,
    state: Mutex<DimensionsState>,
    revision: watch::Sender<u64>,
    runtime: Handle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    weak_self: Weak<DimensionsInner>,
}

/// Dimension values, ranges and domains of one dataset view.
///
/// Dropping the engine disposes it.
pub struct DatasetDimensions {
    inner: Arc<DimensionsInner>,
}

impl DatasetDimensions {
    /// Create the engine, install the domain subscriptions and register on
    /// the dataset for filter changes
    pub fn new(config: DimensionsConfig, dataset: Arc<Dataset>, runtime: Handle) -> Self {
        let (revision, _) = watch::channel(0);
        let inner = Arc::new_cyclic(|weak_self| DimensionsInner {
            dataset,
            descriptors: config.dimensions,
            init_dimensions: config.init_dimensions,
            state: Mutex::new(DimensionsState::default()),
            revision,
            runtime,
            tasks: Mutex::new(Vec::new()),
            weak_self: weak_self.clone(),
        });

        let subscriber: Weak<dyn FilterSubscriber> = Arc::downgrade(&inner) as Weak<dyn FilterSubscriber>;
        inner.dataset.add_subscriber(subscriber);
        inner.install_domains();

        Self { inner }
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.inner.dataset
    }

    pub fn descriptors(&self) -> &[DimensionDescriptor] {
        &self.inner.descriptors
    }

    /// Select a single value. Any range of the dimension is cleared.
    pub fn set_value(&self, id: &str, value: DimensionValue) {
        self.inner.set_value(id, value);
    }

    pub fn unset_value(&self, id: &str) {
        self.inner.unset_value(id);
    }

    /// Select a range. Any single value of the dimension is cleared and the
    /// stored range is the domain-clamped version of `range`.
    pub fn set_range(&self, id: &str, range: DimensionRange) {
        self.inner.set_range(id, range);
    }

    pub fn unset_range(&self, id: &str) {
        self.inner.unset_range(id);
    }

    /// Last resolved domain of a dimension
    pub fn get_dimension_domain(&self, id: &str) -> Option<DataDomain> {
        self.inner.state.lock().resolved_domain(id)
    }

    pub fn value(&self, id: &str) -> Option<DimensionValue> {
        self.inner.state.lock().values.get(id).cloned()
    }

    pub fn range(&self, id: &str) -> Option<DimensionRange> {
        self.inner.state.lock().ranges.get(id).cloned()
    }

    pub fn values(&self) -> AHashMap<String, DimensionValue> {
        self.inner.state.lock().values.clone()
    }

    pub fn ranges(&self) -> AHashMap<String, DimensionRange> {
        self.inner.state.lock().ranges.clone()
    }

    pub fn domains(&self) -> AHashMap<String, Option<DataDomain>> {
        self.inner.state.lock().domains.clone()
    }

    /// Whether a domain request of the dimension is still in flight
    pub fn is_domain_pending(&self, id: &str) -> bool {
        self.inner.state.lock().has_pending_request(id)
    }

    pub fn variable(&self) -> Option<String> {
        self.inner.state.lock().variable.clone()
    }

    /// Set the selected variable, re-running providers depending on it
    pub fn set_variable(&self, variable: Option<String>) {
        let changed = {
            let mut state = self.inner.state.lock();
            if state.disposed || state.variable == variable {
                false
            } else {
                state.variable = variable;
                true
            }
        };
        if changed {
            self.inner.bump_revision();
            self.inner.refresh_dependents(&FilterKey::Variable, None);
        }
    }

    /// Revision counter bumped on every state transition
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    /// Clamp a candidate range against the current (possibly pending) domain
    pub async fn get_domain_clamped_range(&self, id: &str, candidate: Option<DimensionRange>) -> Option<DimensionRange> {
        self.inner.get_domain_clamped_range(id, candidate).await
    }

    /// Wait for all background work currently in flight: domain requests,
    /// range clamps and time initialization.
    ///
    /// Never returns while a provider future stays unresolved.
    pub async fn settled(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.inner.tasks.lock());
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                let _ = task.await;
            }
        }
    }

    pub fn get_snapshot(&self) -> DimensionsSnapshot {
        let state = self.inner.state.lock();
        encode_snapshot(&state.values, &state.ranges)
    }

    /// Replace the current values and ranges with the snapshot content.
    ///
    /// Nothing is modified when an entry fails to decode.
    pub fn apply_snapshot(&self, snapshot: &DimensionsSnapshot) -> DimensionResult<()> {
        let (values, ranges) = decode_snapshot(snapshot)?;

        let (stale_values, stale_ranges) = {
            let state = self.inner.state.lock();
            let stale_values: Vec<String> = state
                .values
                .keys()
                .filter(|id| !values.iter().any(|(v, _)| v == *id))
                .cloned()
                .collect();
            let stale_ranges: Vec<String> = state
                .ranges
                .keys()
                .filter(|id| !ranges.iter().any(|(r, _)| r == *id))
                .cloned()
                .collect();
            (stale_values, stale_ranges)
        };

        for id in stale_values {
            self.inner.unset_value(&id);
        }
        for id in stale_ranges {
            self.inner.unset_range(&id);
        }
        for (id, value) in values {
            self.inner.set_value(&id, value);
        }
        for (id, range) in ranges {
            self.inner.set_range(&id, range);
        }
        Ok(())
    }

    /// Cancel every outstanding domain request and background task
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }
}

impl Drop for DatasetDimensions {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for DatasetDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("DatasetDimensions")
            .field("dataset", &self.inner.dataset.id())
            .field("values", &state.values)
            .field("ranges", &state.ranges)
            .field("domains", &state.domains)
            .finish()
    }
}

impl DimensionsInner {
    fn descriptor(&self, id: &str) -> Option<&DimensionDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.runtime.spawn(future);
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Set up the domain of every dimension once
    fn install_domains(&self) {
        let mut corrections = Vec::new();
        let mut provided = Vec::new();
        {
            let mut state = self.state.lock();
            for descriptor in &self.descriptors {
                match &descriptor.domain {
                    Some(DimensionDomainSpec::Static(domain)) => {
                        state.domains.insert(descriptor.id.clone(), Some(domain.clone()));
                        corrections.extend(self.reconcile(&state, &descriptor.id, Some(domain)));
                    }
                    Some(DimensionDomainSpec::Provider(_)) => {
                        state.domains.insert(descriptor.id.clone(), None);
                        provided.push(descriptor.id.clone());
                    }
                    None => {
                        state.domains.insert(descriptor.id.clone(), None);
                        corrections.extend(self.reconcile(&state, &descriptor.id, None));
                    }
                }
            }
        }

        self.apply_corrections(corrections);
        for id in provided {
            self.request_domain(&id);
        }
    }

    /// Build the filter view handed to the provider of `id`
    fn filter_view(&self, id: &str) -> DimensionFilters {
        let dataset = self.dataset.filters();
        let state = self.state.lock();
        DimensionFilters {
            aoi: dataset.aoi,
            toi: dataset.toi,
            variable: state.variable.clone(),
            dimension_values: state
                .values
                .iter()
                .filter(|(key, _)| key.as_str() != id)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            additional_filters: dataset.additional_filters,
        }
    }

    /// Re-run the providers depending on `key`
    fn refresh_dependents(&self, key: &FilterKey, skip: Option<&str>) {
        let targets: Vec<String> = self
            .descriptors
            .iter()
            .filter(|d| Some(d.id.as_str()) != skip)
            .filter(|d| d.provider().is_some() && d.dependencies.contains(key))
            .map(|d| d.id.clone())
            .collect();

        for id in targets {
            self.request_domain(&id);
        }
    }

    /// Issue a new domain request for `id`, superseding any pending one
    fn request_domain(&self, id: &str) {
        let Some(provider) = self.descriptor(id).and_then(|d| d.provider()).cloned() else {
            return;
        };

        let filters = self.filter_view(id);
        let future = provider.resolve(&filters);

        let (request_id, settler) = {
            let mut state = self.state.lock();
            if state.disposed {
                future.cancel();
                return;
            }
            state.next_request_id += 1;
            let request_id = state.next_request_id;
            let (request, settler) = PendingRequest::new(request_id, future.cancel_handle());
            let settler = Arc::new(settler);
            if let Some(previous) = state.domain_requests.insert(id.to_string(), request) {
                if previous.is_pending() {
                    debug!("Domain request {} for '{}' superseded by {}", previous.id(), id, request_id);
                    previous.cancel();
                }
            }
            // waiters of the superseded request move on to this one right away
            if let Some(previous) = state.domain_settlers.insert(id.to_string(), settler.clone()) {
                previous.settle(Err(DimensionError::Canceled));
            }
            (request_id, settler)
        };

        debug!(
            "Requesting domain for '{}' (request {}, filters v{})",
            id,
            request_id,
            self.dataset.filter_version()
        );

        let weak = self.weak_self.clone();
        let id = id.to_string();
        self.spawn(async move {
            let result = future.await;
            match weak.upgrade() {
                Some(inner) => inner.commit_domain(&id, request_id, result, settler),
                None => settler.settle(Err(DimensionError::Canceled)),
            }
        });
    }

    /// Store a settled domain if its request is still the installed one, then
    /// reconcile the dimension against it
    fn commit_domain(
        &self,
        id: &str,
        request_id: u64,
        result: DimensionResult<DataDomain>,
        settler: Arc<RequestSettler<DataDomain>>,
    ) {
        let corrections = {
            let mut state = self.state.lock();
            let current = state
                .domain_requests
                .get(id)
                .map_or(false, |request| request.id() == request_id && !request.is_canceled());
            if state.disposed || !current {
                debug!("Discarding stale domain result for '{}' (request {})", id, request_id);
                settler.settle(Err(DimensionError::Canceled));
                return;
            }

            match result {
                Ok(domain) => {
                    debug!("Domain for '{}' resolved (request {})", id, request_id);
                    state.domains.insert(id.to_string(), Some(domain.clone()));
                    let corrections = self.reconcile(&state, id, Some(&domain));
                    settler.settle(Ok(domain));
                    corrections
                }
                Err(e) => {
                    if !e.is_canceled() {
                        warn!("Domain request for '{}' failed: {}", id, e);
                    }
                    settler.settle(Err(e));
                    return;
                }
            }
        };

        self.bump_revision();
        self.apply_corrections(corrections);
    }

    /// Check the current selection of `id` against `domain` and collect the
    /// writes needed to fix it
    fn reconcile(&self, state: &DimensionsState, id: &str, domain: Option<&DataDomain>) -> Vec<Correction> {
        let mut corrections = Vec::new();

        if let Some(value) = state.values.get(id) {
            if let Some(correction) = domain.and_then(|d| reconcile_value(value, d)) {
                debug!("Value {} of '{}' outside its domain", value, id);
                corrections.push(match correction {
                    ValueCorrection::Set(v) => Correction::SetValue(id.to_string(), v),
                    ValueCorrection::Unset => Correction::UnsetValue(id.to_string()),
                });
            }
        } else if let Some(range) = state.ranges.get(id) {
            if let (Some(domain), DimensionRange::Interval { .. }) = (domain, range) {
                let clamped = clamp_range(Some(domain), Some(range.clone()));
                if clamped.as_ref() != Some(range) {
                    corrections.push(match clamped {
                        Some(clamped) => Correction::SetRange(id.to_string(), clamped),
                        None => Correction::UnsetRange(id.to_string()),
                    });
                }
            }
        } else if self.init_dimensions {
            if id == TIME_DIMENSION_ID {
                corrections.push(Correction::InitTime(id.to_string(), domain.cloned()));
            } else if let Some(value) = domain.and_then(DataDomain::initial_value) {
                corrections.push(Correction::SetValue(id.to_string(), value));
            }
        }

        corrections
    }

    fn apply_corrections(&self, corrections: Vec<Correction>) {
        for correction in corrections {
            match correction {
                Correction::SetValue(id, value) => self.set_value(&id, value),
                Correction::UnsetValue(id) => self.unset_value(&id),
                Correction::SetRange(id, range) => self.set_range(&id, range),
                Correction::UnsetRange(id) => self.unset_range(&id),
                Correction::InitTime(id, domain) => self.init_time(&id, domain),
            }
        }
    }

    /// Initialize the time dimension from the dataset time of interest
    fn init_time(&self, id: &str, domain: Option<DataDomain>) {
        match self.dataset.toi() {
            Some(TimeOfInterest::Instant(t)) => {
                self.set_value_if_unset(id, DimensionValue::Time(t));
            }
            Some(TimeOfInterest::Range(range)) => {
                let Some(provider) = self.dataset.time_distribution() else {
                    self.set_value_if_unset(id, DimensionValue::Time(range.end));
                    return;
                };

                let filters = FilterSelection::Explicit(self.dataset.filters());
                let weak = self.weak_self.clone();
                let id = id.to_string();
                self.spawn(async move {
                    let nearest = provider
                        .get_nearest_item(range.end, Some(SearchDirection::Backward), filters)
                        .await;
                    let time = match nearest {
                        Ok(Some(item)) => item.start,
                        Ok(None) => range.end,
                        Err(e) => {
                            warn!("Nearest item lookup for '{}' failed, using toi end: {}", id, e);
                            range.end
                        }
                    };
                    if let Some(inner) = weak.upgrade() {
                        inner.set_value_if_unset(&id, DimensionValue::Time(time));
                    }
                });
            }
            None => {
                if let Some(value) = domain.as_ref().and_then(DataDomain::initial_value) {
                    self.set_value_if_unset(id, value);
                }
            }
        }
    }

    fn set_value_if_unset(&self, id: &str, value: DimensionValue) {
        {
            let state = self.state.lock();
            if state.disposed || state.values.contains_key(id) || state.ranges.contains_key(id) {
                return;
            }
        }
        self.set_value(id, value);
    }

    fn set_value(&self, id: &str, value: DimensionValue) {
        let (value_changed, corrections) = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            let range_removed = state.ranges.remove(id).is_some();
            state.issue_ticket(id);
            let value_changed = state.values.get(id) != Some(&value);
            if !value_changed && !range_removed {
                return;
            }
            state.values.insert(id.to_string(), value);

            // a pending request reconciles the value once it settles
            let corrections = if state.has_pending_request(id) {
                Vec::new()
            } else {
                let domain = state.resolved_domain(id);
                self.reconcile(&state, id, domain.as_ref())
            };
            (value_changed, corrections)
        };

        self.bump_revision();
        if !corrections.is_empty() {
            // the corrected write refreshes the dependents
            self.apply_corrections(corrections);
        } else if value_changed {
            self.refresh_dependents(&FilterKey::Dimension(id.to_string()), Some(id));
        }
    }

    fn unset_value(&self, id: &str) {
        {
            let mut state = self.state.lock();
            if state.disposed || state.values.remove(id).is_none() {
                return;
            }
        }

        self.bump_revision();
        self.refresh_dependents(&FilterKey::Dimension(id.to_string()), Some(id));
    }

    fn set_range(&self, id: &str, range: DimensionRange) {
        let (ticket, value_removed) = {
            let mut state = self.state.lock();
            if state.disposed || state.ranges.get(id) == Some(&range) {
                return;
            }
            let value_removed = state.values.remove(id).is_some();
            let ticket = state.issue_ticket(id);

            if !state.has_pending_request(id) {
                // domain already known, clamp right away
                let domain = state.resolved_domain(id);
                let clamped = clamp_range(domain.as_ref(), Some(range));
                let range_changed = state.ranges.get(id) != clamped.as_ref();
                match clamped {
                    Some(clamped) => {
                        state.ranges.insert(id.to_string(), clamped);
                    }
                    None => {
                        state.ranges.remove(id);
                    }
                }
                drop(state);

                if range_changed || value_removed {
                    self.bump_revision();
                }
                if value_removed {
                    self.refresh_dependents(&FilterKey::Dimension(id.to_string()), Some(id));
                }
                return;
            }
            (ticket, value_removed)
        };

        if value_removed {
            self.bump_revision();
            self.refresh_dependents(&FilterKey::Dimension(id.to_string()), Some(id));
        }

        let weak = self.weak_self.clone();
        let id = id.to_string();
        self.spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let clamped = inner.get_domain_clamped_range(&id, Some(range)).await;
            inner.commit_range(&id, ticket, clamped);
        });
    }

    fn commit_range(&self, id: &str, ticket: u64, clamped: Option<DimensionRange>) {
        {
            let mut state = self.state.lock();
            if state.disposed || state.range_tickets.get(id) != Some(&ticket) {
                debug!("Discarding outdated range write for '{}'", id);
                return;
            }
            if state.ranges.get(id) == clamped.as_ref() {
                return;
            }
            match clamped {
                Some(range) => {
                    state.ranges.insert(id.to_string(), range);
                }
                None => {
                    state.ranges.remove(id);
                }
            }
        }
        self.bump_revision();
    }

    fn unset_range(&self, id: &str) {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.issue_ticket(id);
            if state.ranges.remove(id).is_none() {
                return;
            }
        }
        self.bump_revision();
    }

    async fn get_domain_clamped_range(&self, id: &str, candidate: Option<DimensionRange>) -> Option<DimensionRange> {
        loop {
            let (pending, domain) = {
                let state = self.state.lock();
                match state.domain_requests.get(id) {
                    Some(request) if request.is_pending() => (Some(request.clone()), None),
                    _ => (None, state.resolved_domain(id)),
                }
            };

            let Some(request) = pending else {
                return clamp_range(domain.as_ref(), candidate);
            };

            match request.wait().await {
                Ok(domain) => return clamp_range(Some(&domain), candidate),
                Err(e) => {
                    let superseded = {
                        let state = self.state.lock();
                        !state.disposed
                            && state
                                .domain_requests
                                .get(id)
                                .map_or(false, |current| current.id() != request.id())
                    };
                    if superseded && e.is_canceled() {
                        continue;
                    }
                    debug!("Domain lookup for '{}' failed, keeping range unclamped: {}", id, e);
                    return candidate;
                }
            }
        }
    }

    fn dispose(&self) {
        let (requests, settlers) = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            let requests: Vec<PendingRequest<DataDomain>> = state.domain_requests.values().cloned().collect();
            let settlers: Vec<_> = state.domain_settlers.drain().map(|(_, settler)| settler).collect();
            (requests, settlers)
        };

        for request in requests.iter().filter(|r| r.is_pending()) {
            request.cancel();
        }
        for settler in settlers {
            settler.settle(Err(DimensionError::Canceled));
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        debug!("Disposed dimensions of dataset {}", self.dataset.id());
    }
}

impl FilterSubscriber for DimensionsInner {
    fn on_filters_change(&self, change: &FilterKey, _filters: &DatasetFilters) {
        if self.state.lock().disposed {
            return;
        }
        self.refresh_dependents(change, None);
    }
}
