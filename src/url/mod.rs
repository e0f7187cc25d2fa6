//! URL handling for Kagami
//!
//! This module provides the canonical URL-key normalization used by the
//! visited set, the frontier, and the deferred-resource map, plus the
//! origin checks that drive resource classification.

use crate::UrlError;
use url::Url;

/// Normalizes a URL string into its canonical mirrored identity
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject non-HTTP(S) schemes
/// 3. Lowercase the host
/// 4. Normalize the path:
///    - Remove dot segments (`.` and `..`)
///    - Collapse duplicate slashes
///    - Remove the trailing slash (except for the root `/`)
/// 5. Remove the fragment
/// 6. Remove the query string
///
/// Two URLs differing only by fragment, query, or trailing slash map to
/// the same canonical identity. This rule is applied uniformly to page
/// URLs and deferred-resource keys.
///
/// # Examples
///
/// ```
/// use kagami::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.COM/gallery/#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/gallery");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if let Some(host) = url.host_str() {
        let lowered = host.to_lowercase();
        url.set_host(Some(&lowered))
            .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
    } else {
        return Err(UrlError::MissingHost);
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);
    url.set_query(None);

    Ok(url)
}

/// Returns the canonical key for an already-parsed URL
///
/// The key is the normalized URL string: fragment and query dropped,
/// trailing slash trimmed. Equality over keys is the dedupe rule for the
/// visited set and the frontier.
pub fn url_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_fragment(None);
    key.set_query(None);
    key.set_path(&normalize_path(key.path()));
    key.to_string()
}

/// Returns true if two URLs share the same host
///
/// This is the resource classification rule: a resource whose host matches
/// the page's host is SAME_ORIGIN, anything else is CROSS_ORIGIN.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str()
}

/// Returns true if `url` belongs to the configured site
///
/// A discovered link is a frontier candidate only when its scheme, host,
/// and port all match the seed URL.
pub fn within_site(url: &Url, site: &Url) -> bool {
    url.scheme() == site.scheme()
        && url.host_str() == site.host_str()
        && url.port_or_known_default() == site.port_or_known_default()
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

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
