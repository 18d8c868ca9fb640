//! robots.txt rules evaluated with the robotstxt crate

use robotstxt::DefaultMatcher;

/// Rules from one robots.txt file
#[derive(Debug, Clone)]
pub struct RobotsRules {
    content: String,
    allow_all: bool,
}

impl RobotsRules {
    /// Wraps raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Rules that allow everything
    ///
    /// Used when a host has no robots.txt or it could not be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Checks if a URI is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `uri` - Absolute URI to check
    /// * `user_agent` - Product token or full user agent string
    pub fn is_allowed(&self, uri: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, product_token(user_agent), uri)
    }
}

/// Extracts the product token robots.txt groups are matched on:
/// `crawl-frontier/0.1 (+https://..)` becomes `crawl-frontier`
fn product_token(user_agent: &str) -> &str {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .filter(|t| !t.is_empty())
        .unwrap_or(user_agent)
}
