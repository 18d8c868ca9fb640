//! URI canonicalization, crawl scope and discovery paths
//!
//! Every URI entering the frontier is reduced to a SURT key. The key decides
//! duplicates within an execution and is matched against the execution's scope
//! prefix before anything is queued.

mod surt;

pub use surt::{canonicalize, CanonicalUri};

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a URI was discovered, encoded as one character of the discovery path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscoveryType {
    /// Extracted from a link on the page
    #[serde(rename = "L")]
    Link,
    /// Embedded resource (image, script, stylesheet)
    #[serde(rename = "E")]
    Embed,
    /// Placeholder for a precondition such as DNS or robots.txt
    #[serde(rename = "P")]
    Precondition,
}

impl DiscoveryType {
    pub fn as_char(&self) -> char {
        match self {
            DiscoveryType::Link => 'L',
            DiscoveryType::Embed => 'E',
            DiscoveryType::Precondition => 'P',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'L' => Some(DiscoveryType::Link),
            'E' => Some(DiscoveryType::Embed),
            'P' => Some(DiscoveryType::Precondition),
            _ => None,
        }
    }
}

impl fmt::Display for DiscoveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Depth of a URI: the number of discovery steps from its seed
pub fn depth(discovery_path: &str) -> u32 {
    discovery_path.chars().count() as u32
}

/// Extends a parent's discovery path by one step
pub fn child_path(parent_path: &str, discovery_type: DiscoveryType) -> String {
    let mut path = String::with_capacity(parent_path.len() + 1);
    path.push_str(parent_path);
    path.push(discovery_type.as_char());
    path
}

/// Derives the default scope of a seed: its reversed host, left open so that
/// subdomains match.
///
/// The scheme is dropped so that a site is crawled over both http and https;
/// `https://(com,example,)/page` yields `(com,example,`.
pub fn scope_for_surt(surt: &str) -> String {
    let hostpart = match surt.split_once("://") {
        Some((_, rest)) => rest,
        None => surt,
    };
    match hostpart.find(')') {
        Some(end) => {
            let authority = &hostpart[..end];
            // Strip a port so that other ports on the same host stay in scope
            match authority.rfind(",:") {
                Some(port) => authority[..=port].to_string(),
                None => authority.to_string(),
            }
        }
        None => hostpart.to_string(),
    }
}

/// Checks a SURT against a scope prefix
///
/// A prefix without a scheme (`(com,example,`) matches both http and https.
pub fn in_scope(surt: &str, scope: &str) -> bool {
    if scope.is_empty() {
        return true;
    }

    if scope.contains("://") {
        return surt.starts_with(scope);
    }

    match surt.split_once("://") {
        Some((_, rest)) => rest.starts_with(scope),
        None => surt.starts_with(scope),
    }
}
