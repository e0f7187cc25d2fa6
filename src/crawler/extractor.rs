//! Rendered-page extraction and rewriting
//!
//! This module turns one rendered DOM into everything the crawl loop needs
//! from it: the page rewritten to reference local paths, the embedded
//! resources classified by origin, and the on-site links that are frontier
//! candidates. It also hosts the CAPTCHA predicate.

use crate::paths::PathMapper;
use crate::url::{same_origin, within_site};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

/// Element/attribute pairs that carry embedded resource references
const RESOURCE_SELECTORS: &[(&str, &str)] = &[
    ("img[src]", "src"),
    ("script[src]", "src"),
    ("link[rel='stylesheet'][href]", "href"),
];

/// Whether a resource lives on the page's own host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Host matches the page's host; downloaded during the run phase
    SameOrigin,
    /// Third-party host; deferred to the proxied batch phase
    CrossOrigin,
}

/// One embedded resource discovered on a page
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    /// Resolved source URL
    pub url: Url,
    /// Target location under the save root
    pub local_path: PathBuf,
    pub origin: Origin,
}

/// Everything extracted from one rendered page
#[derive(Debug)]
pub struct ExtractedPage {
    /// The DOM with resource references rewritten to relative local paths
    pub html: String,
    pub resources: Vec<ResourceEntry>,
    /// On-site links, resolved against the page URL
    pub links: Vec<Url>,
}

/// CAPTCHA predicate: does the rendered DOM carry the challenge marker?
pub fn contains_captcha_marker(dom: &str, marker: &str) -> bool {
    !marker.is_empty() && dom.contains(marker)
}

/// Extracts resources and links from a rendered page
///
/// Resource references (`img`/`script` sources, stylesheet links) are
/// resolved against the page URL, classified same- or cross-origin by host
/// match, and rewritten in place to the path relative to `page_path` — the
/// saved document is self-contained once its resources arrive. Anchor
/// hrefs are resolved the same way and kept only when they stay on the
/// page's site.
pub fn extract(html: &str, page_url: &Url, page_path: &Path, mapper: &PathMapper) -> ExtractedPage {
    let document = Html::parse_document(html);
    let mut rewritten = html.to_string();
    let mut resources = Vec::new();
    let mut seen_resources: HashSet<String> = HashSet::new();

    for (selector_str, attr) in RESOURCE_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };

        for element in document.select(&selector) {
            let Some(raw) = element.value().attr(attr) else {
                continue;
            };
            let Some(resolved) = resolve_reference(raw, page_url) else {
                continue;
            };

            let local_path = mapper.map_resource_url(&resolved);
            let reference = PathMapper::relative_reference(page_path, &local_path);
            rewrite_attribute(&mut rewritten, element.value().name(), attr, raw, &reference);

            if seen_resources.insert(resolved.to_string()) {
                let origin = if same_origin(page_url, &resolved) {
                    Origin::SameOrigin
                } else {
                    Origin::CrossOrigin
                };
                resources.push(ResourceEntry {
                    url: resolved,
                    local_path,
                    origin,
                });
            }
        }
    }

    let links = extract_links(&document, page_url);

    ExtractedPage {
        html: rewritten,
        resources,
        links,
    }
}

/// Collects on-site anchor targets from the document
fn extract_links(document: &Html, page_url: &Url) -> Vec<Url> {
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(resolved) = resolve_reference(href, page_url) else {
                continue;
            };
            if within_site(&resolved, page_url) {
                links.push(resolved);
            }
        }
    }

    links
}

/// Resolves a raw attribute value to an absolute HTTP(S) URL
///
/// Returns None for special schemes (javascript:, mailto:, tel:, data:),
/// fragment-only anchors, and anything that fails to resolve.
fn resolve_reference(raw: &str, base_url: &Url) -> Option<Url> {
    let raw = raw.trim();

    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }

    if raw.starts_with("javascript:")
        || raw.starts_with("mailto:")
        || raw.starts_with("tel:")
        || raw.starts_with("data:")
    {
        return None;
    }

    match base_url.join(raw) {
        Ok(resolved) if resolved.scheme() == "http" || resolved.scheme() == "https" => {
            Some(resolved)
        }
        _ => None,
    }
}

/// Replaces a quoted attribute value in the serialized DOM
///
/// Both quote styles are handled. An occurrence is rewritten only when
/// its enclosing element matches `tag`, so an anchor whose href happens
/// to equal a stylesheet URL keeps its page link intact.
fn rewrite_attribute(html: &mut String, tag: &str, attr: &str, from: &str, to: &str) {
    for quote in ['"', '\''] {
        let needle = format!("{}={}{}{}", attr, quote, from, quote);
        let replacement = format!("{}={}{}{}", attr, quote, to, quote);

        let mut result = String::with_capacity(html.len());
        let mut cursor = 0;
        while let Some(offset) = html[cursor..].find(&needle) {
            let pos = cursor + offset;
            result.push_str(&html[cursor..pos]);
            if enclosing_tag_is(&html[..pos], tag) {
                result.push_str(&replacement);
            } else {
                result.push_str(&needle);
            }
            cursor = pos + needle.len();
        }
        result.push_str(&html[cursor..]);
        *html = result;
    }
}

/// Whether the last tag opened before this point in the markup is `tag`
fn enclosing_tag_is(prefix: &str, tag: &str) -> bool {
    match prefix.rfind('<') {
        Some(lt) => {
            let name: String = prefix[lt + 1..]
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect();
            name.eq_ignore_ascii_case(tag)
        }
        None => false,
    }
}
