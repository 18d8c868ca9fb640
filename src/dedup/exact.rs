//! Exact set of SURT keys

use crate::dedup::UriFilter;
use std::collections::HashSet;
use std::sync::Mutex;

/// Exact membership set; no false positives, memory grows with the crawl
#[derive(Debug, Default)]
pub struct ExactFilter {
    keys: Mutex<HashSet<String>>,
}

impl ExactFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.lock().map(|k| k.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UriFilter for ExactFilter {
    fn might_contain(&self, surt: &str) -> bool {
        match self.keys.lock() {
            Ok(keys) => keys.contains(surt),
            Err(poisoned) => poisoned.into_inner().contains(surt),
        }
    }

    fn add(&self, surt: &str) -> bool {
        match self.keys.lock() {
            Ok(mut keys) => keys.insert(surt.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(surt.to_string()),
        }
    }

    fn remove(&self, surt: &str) {
        match self.keys.lock() {
            Ok(mut keys) => keys.remove(surt),
            Err(poisoned) => poisoned.into_inner().remove(surt),
        };
    }
}
