use crate::UriError;
use url::{form_urlencoded, Host, Url};

/// A URI together with its canonical sort-friendly key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUri {
    /// The URI as it will be handed to the harvester (fragment removed)
    pub uri: String,

    /// SURT form of the canonicalized URI, used for dedup and ordering
    pub surt: String,

    /// Lowercased host with any `www.` prefix removed
    pub host: String,
}

/// Canonicalizes a URI and computes its SURT key
///
/// # Canonicalization Steps
///
/// 1. Parse the URI; reject if malformed or not http/https
/// 2. Lowercase the host and remove a leading `www.`
/// 3. Drop the default port (the parser does this for http/https)
/// 4. Remove dot segments, duplicate slashes and trailing slashes (except root)
/// 5. Remove the fragment
/// 6. Sort query parameters by key, keeping the relative order of equal keys
/// 7. Drop an empty query string
/// 8. Reverse the host labels into `(tld,domain,sub,)` and append the port if any
///
/// The result is a pure function of the input: URIs differing only in host
/// case, fragment, default port or query parameter order share one SURT.
///
/// # Examples
///
/// ```
/// use crawl_frontier::uri::canonicalize;
///
/// let c = canonicalize("http://www.Example.com:80/a/../b?z=1&a=2#x").unwrap();
/// assert_eq!(c.surt, "http://(com,example,)/b?a=2&z=1");
/// assert_eq!(c.uri, "http://www.example.com/b?z=1&a=2");
/// ```
pub fn canonicalize(raw: &str) -> Result<CanonicalUri, UriError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| UriError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UriError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    url.set_fragment(None);
    let fetch_uri = url.to_string();

    let host = match url.host() {
        Some(Host::Domain(domain)) => {
            let lower = domain.to_lowercase();
            let stripped = lower.strip_prefix("www.").unwrap_or(&lower);
            if stripped.is_empty() {
                return Err(UriError::MissingHost);
            }
            stripped.to_string()
        }
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => format!("[{}]", addr),
        None => return Err(UriError::MissingHost),
    };

    let mut surt = String::with_capacity(fetch_uri.len() + 8);
    surt.push_str(url.scheme());
    surt.push_str("://(");
    surt.push_str(&surt_authority(&host));
    if let Some(port) = url.port() {
        surt.push(':');
        surt.push_str(&port.to_string());
    }
    surt.push(')');
    surt.push_str(&normalize_path(url.path()));

    if url.query().is_some() {
        let query = sorted_query(&url);
        if !query.is_empty() {
            surt.push('?');
            surt.push_str(&query);
        }
    }

    Ok(CanonicalUri {
        uri: fetch_uri,
        surt,
        host,
    })
}

/// Reverses the labels of a host name: `blog.example.com` becomes `com,example,blog,`
///
/// IP addresses are kept as they are.
pub(crate) fn surt_authority(host: &str) -> String {
    let is_ip = host.starts_with('[') || host.parse::<std::net::Ipv4Addr>().is_ok();
    if is_ip {
        return format!("{},", host);
    }

    let mut reversed = String::with_capacity(host.len() + 1);
    for label in host.split('.').rev().filter(|l| !l.is_empty()) {
        reversed.push_str(label);
        reversed.push(',');
    }
    reversed
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

/// Re-encodes the query with parameters sorted by key
fn sorted_query(url: &Url) -> String {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    // Stable sort keeps repeated keys in their original order
    params.sort_by(|a, b| a.0.cmp(&b.0));

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}
