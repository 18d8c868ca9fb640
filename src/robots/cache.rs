//! Per-host cache of robots.txt rules

use crate::robots::RobotsRules;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// robots.txt rules together with the time they were fetched
#[derive(Debug, Clone)]
pub struct CachedRules {
    pub rules: RobotsRules,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRules {
    pub fn new(rules: RobotsRules) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the entry is older than `ttl`
    pub fn is_stale(&self, ttl: Duration) -> bool {
        Utc::now() - self.fetched_at > ttl
    }
}

/// Rules keyed by origin (`scheme://host[:port]`)
pub struct RulesCache {
    entries: Mutex<HashMap<String, CachedRules>>,
    ttl: Duration,
}

impl RulesCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the rules for an origin unless missing or stale
    pub fn get(&self, origin: &str) -> Option<RobotsRules> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(origin)
            .filter(|cached| !cached.is_stale(self.ttl))
            .map(|cached| cached.rules.clone())
    }

    pub fn insert(&self, origin: &str, rules: RobotsRules) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(origin.to_string(), CachedRules::new(rules));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
