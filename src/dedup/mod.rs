//! Duplicate suppression for queued URIs
//!
//! Each crawl execution gets its own filter, keyed by SURT. A filter is only
//! consulted when a URI is about to be queued; the queue store stays the source
//! of truth for pending work.
//!
//! # Policy
//!
//! - `add` is an atomic check-and-insert. Only the caller that inserted a key
//!   enqueues the URI, so two simultaneous discoveries cannot both be queued.
//! - `remove` rolls back an `add` whose enqueue failed.
//! - The whole filter is released when its execution reaches a terminal state.

mod bloom;
mod exact;

pub use bloom::BloomFilter;
pub use exact::ExactFilter;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Set membership over SURT keys, safe for concurrent use
pub trait UriFilter: Send + Sync {
    /// Returns true if `surt` may have been added; false means it never was
    fn might_contain(&self, surt: &str) -> bool;

    /// Inserts `surt`, returning true if it was not present before
    fn add(&self, surt: &str) -> bool;

    /// Forgets `surt` if the implementation supports removal
    fn remove(&self, surt: &str);
}

type FilterFactory = Box<dyn Fn() -> Arc<dyn UriFilter> + Send + Sync>;

/// Registry of per-execution filters
pub struct DedupFilter {
    filters: RwLock<HashMap<String, Arc<dyn UriFilter>>>,
    factory: FilterFactory,
}

impl DedupFilter {
    /// Creates a registry handing out Bloom filters of the given sizing
    pub fn bloom(expected_items: usize, false_positive_rate: f64) -> Self {
        Self::with_factory(move || {
            Arc::new(BloomFilter::new(expected_items, false_positive_rate)) as Arc<dyn UriFilter>
        })
    }

    /// Creates a registry handing out exact sets
    pub fn exact() -> Self {
        Self::with_factory(|| Arc::new(ExactFilter::new()) as Arc<dyn UriFilter>)
    }

    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<dyn UriFilter> + Send + Sync + 'static,
    {
        Self {
            filters: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Returns the filter of an execution, creating it on first use
    pub fn for_execution(&self, execution_id: &str) -> Arc<dyn UriFilter> {
        if let Ok(filters) = self.filters.read() {
            if let Some(filter) = filters.get(execution_id) {
                return Arc::clone(filter);
            }
        }

        let mut filters = match self.filters.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            filters
                .entry(execution_id.to_string())
                .or_insert_with(|| (self.factory)()),
        )
    }

    /// Drops the filter of a finished execution
    pub fn release(&self, execution_id: &str) {
        let mut filters = match self.filters.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        filters.remove(execution_id);
    }

    /// Number of executions currently holding a filter
    pub fn active(&self) -> usize {
        self.filters.read().map(|f| f.len()).unwrap_or(0)
    }
}
