//! URL handling module for Trawl
//!
//! This module provides work-unit identity (normalization), host extraction,
//! link resolution, and the domain matching used to pick a selector schema.

mod domain;
mod matcher;
mod normalize;

use url::Url;

pub use domain::extract_domain;
pub use matcher::matches_domain;
pub use normalize::{normalize_parsed, normalize_url};

/// Resolves a link href against the page it was found on
///
/// Returns `None` if the link cannot be followed:
/// - empty hrefs and fragment-only anchors
/// - `javascript:`, `mailto:`, `tel:` and `data:` links
/// - anything that does not resolve to an HTTP(S) URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use trawl::url::resolve_link;
///
/// let base = Url::parse("https://example.com/list?page=1").unwrap();
/// let next = resolve_link("?page=2", &base).unwrap();
/// assert_eq!(next.as_str(), "https://example.com/list?page=2");
/// assert!(resolve_link("javascript:void(0)", &base).is_none());
/// ```
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute)
        }
        _ => None,
    }
}
