use crate::url::normalize_parsed;
use crate::UrlError;
use url::Url;

/// One page-fetch task
///
/// A unit is immutable once created. Its identity is the normalized form of
/// its URL (see [`crate::url::normalize_url`]); the URL itself is fetched
/// exactly as discovered, minus the fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    url: Url,
    key: String,
    depth: u32,
    discovered_from: Option<Url>,
}

impl WorkUnit {
    /// Creates a seed unit at depth 0
    pub fn seed(url: &str) -> Result<Self, UrlError> {
        let parsed = Url::parse(url).map_err(|e| UrlError::Parse(e.to_string()))?;
        Self::new(parsed, 0, None)
    }

    /// Creates a unit discovered on `parent`, one level deeper
    pub fn discovered(url: Url, parent: &WorkUnit) -> Result<Self, UrlError> {
        Self::new(url, parent.depth + 1, Some(parent.url.clone()))
    }

    /// Rebuilds a unit from its persisted parts
    pub fn restore(url: &str, depth: u32, discovered_from: Option<&str>) -> Result<Self, UrlError> {
        let parsed = Url::parse(url).map_err(|e| UrlError::Parse(e.to_string()))?;
        let from = discovered_from.and_then(|u| Url::parse(u).ok());
        Self::new(parsed, depth, from)
    }

    fn new(mut url: Url, depth: u32, discovered_from: Option<Url>) -> Result<Self, UrlError> {
        url.set_fragment(None);
        let key = normalize_parsed(url.clone())?.to_string();

        Ok(Self {
            url,
            key,
            depth,
            discovered_from,
        })
    }

    /// The URL to fetch
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Normalized identity used for dedup and resume
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn discovered_from(&self) -> Option<&Url> {
        self.discovered_from.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_unit() {
        let unit = WorkUnit::seed("https://example.com/list#top").unwrap();
        assert_eq!(unit.depth(), 0);
        assert_eq!(unit.url().as_str(), "https://example.com/list");
        assert_eq!(unit.key(), "https://example.com/list");
        assert!(unit.discovered_from().is_none());
    }

    #[test]
    fn test_discovered_unit() {
        let seed = WorkUnit::seed("https://example.com/list").unwrap();
        let next = Url::parse("https://example.com/list?page=2").unwrap();
        let unit = WorkUnit::discovered(next, &seed).unwrap();

        assert_eq!(unit.depth(), 1);
        assert_eq!(
            unit.discovered_from().map(|u| u.as_str()),
            Some("https://example.com/list")
        );
    }

    #[test]
    fn test_key_is_normalized_but_url_is_not() {
        let unit = WorkUnit::seed("https://example.com/list/?b=2&a=1").unwrap();
        assert_eq!(unit.url().as_str(), "https://example.com/list/?b=2&a=1");
        assert_eq!(unit.key(), "https://example.com/list?a=1&b=2");
    }

    #[test]
    fn test_restore() {
        let unit =
            WorkUnit::restore("https://example.com/list?page=3", 2, Some("https://example.com/list?page=2"))
                .unwrap();
        assert_eq!(unit.depth(), 2);
        assert!(unit.discovered_from().is_some());
    }

    #[test]
    fn test_rejects_non_http() {
        assert!(WorkUnit::seed("ftp://example.com/file").is_err());
    }
}
