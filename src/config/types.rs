use indexmap::IndexMap;
use serde::Deserialize;

/// Placeholder substituted with the page number in a `page_param` template
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Crawl settings for Trawl
///
/// Every section is optional in the TOML file; missing keys take the
/// defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub retry: RetryConfig,
    pub state: StateConfig,
    pub identity: IdentityConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of units in flight at once
    pub concurrency: u32,

    /// Global request rate in requests per second (0 disables the limit)
    pub rate_limit: f64,

    /// Stop accepting records once this many have been extracted
    pub max_items: Option<usize>,

    /// Stop dispatching once this many pages have been visited
    pub max_pages: Option<u32>,

    /// Per-request timeout handed to the renderer (seconds)
    pub request_timeout_secs: u64,

    /// How long in-flight units may run after cancellation (seconds)
    pub drain_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            rate_limit: 1.0,
            max_items: None,
            max_pages: None,
            request_timeout_secs: 30,
            drain_timeout_secs: 30,
        }
    }
}

/// Retry policy for transient fetch failures
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Total fetch attempts per unit, including the first
    pub max_attempts: u32,

    /// Backoff before the second attempt (milliseconds); doubles per attempt
    pub backoff_base_ms: u64,

    /// Upper bound on a single backoff (milliseconds)
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
        }
    }
}

/// Resumable state configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StateConfig {
    /// Whether completed units are persisted between runs
    pub enabled: bool,

    /// Path to the SQLite state database
    pub database_path: String,

    /// Flush after this many completions
    pub flush_every: usize,

    /// Flush at least this often while completions are pending (seconds)
    pub flush_interval_secs: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: "trawl_state.db".to_string(),
            flush_every: 10,
            flush_interval_secs: 5,
        }
    }
}

/// Outgoing request identity: user agents, proxies and extra headers
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct IdentityConfig {
    /// Pool of User-Agent strings to rotate through
    pub user_agents: Vec<String>,

    /// How the next user agent is picked from the pool
    pub rotation: Rotation,

    /// Proxy URLs assigned round-robin; empty means direct connections
    pub proxies: Vec<String>,

    /// Headers added to every request unless already set
    pub headers: IndexMap<String, String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_agents: default_user_agents(),
            rotation: Rotation::RoundRobin,
            proxies: Vec::new(),
            headers: IndexMap::new(),
        }
    }
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    ]
    .iter()
    .map(|ua| ua.to_string())
    .collect()
}

/// Pool selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rotation {
    #[default]
    RoundRobin,
    Random,
}

/// How a site exposes its next page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationKind {
    /// Follow the link on an element matching the selector
    #[serde(alias = "NEXT_BUTTON")]
    NextButton,

    /// Substitute an incremented page number into a URL template
    #[serde(alias = "PAGE_PARAM", alias = "url_pattern")]
    PageParam,

    /// Follow a scroll trigger's link target, if the markup exposes one
    #[serde(alias = "INFINITE_SCROLL")]
    InfiniteScroll,
}

/// Pagination descriptor attached to a selector schema
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaginationRule {
    #[serde(rename = "type")]
    pub kind: PaginationKind,

    /// CSS selector for `next_button` and `infinite_scroll`
    #[serde(default)]
    pub selector: Option<String>,

    /// URL template with a `{page}` placeholder for `page_param`
    #[serde(default)]
    pub template: Option<String>,

    /// Page ceiling declared by the site entry itself
    #[serde(default)]
    pub max_pages: Option<u32>,
}

impl PaginationRule {
    pub fn next_button(selector: impl Into<String>) -> Self {
        Self {
            kind: PaginationKind::NextButton,
            selector: Some(selector.into()),
            template: None,
            max_pages: None,
        }
    }

    pub fn page_param(template: impl Into<String>) -> Self {
        Self {
            kind: PaginationKind::PageParam,
            selector: None,
            template: Some(template.into()),
            max_pages: None,
        }
    }

    pub fn infinite_scroll(selector: impl Into<String>) -> Self {
        Self {
            kind: PaginationKind::InfiniteScroll,
            selector: Some(selector.into()),
            template: None,
            max_pages: None,
        }
    }
}

/// Per-site extraction description
///
/// Loaded once at crawl start and shared read-only with the extractor and
/// paginator for the lifetime of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSchema {
    /// Key used to pick this schema explicitly (`--config`)
    pub name: String,

    /// Substring (or `*.` wildcard) matched against the seed host
    pub domain_pattern: String,

    /// Selector for the repeating item element
    pub container_selector: Option<String>,

    /// Field name -> field selector, in declaration order
    pub fields: IndexMap<String, String>,

    pub pagination: Option<PaginationRule>,
}

impl SelectorSchema {
    pub fn new(name: impl Into<String>, domain_pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain_pattern: domain_pattern.into(),
            container_selector: None,
            fields: IndexMap::new(),
            pagination: None,
        }
    }

    pub fn with_container(mut self, selector: impl Into<String>) -> Self {
        self.container_selector = Some(selector.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, selector: impl Into<String>) -> Self {
        self.fields.insert(name.into(), selector.into());
        self
    }

    pub fn with_pagination(mut self, rule: PaginationRule) -> Self {
        self.pagination = Some(rule);
        self
    }
}

/// One site entry as written in the selector schema JSON
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SiteEntry {
    #[serde(default)]
    pub domain: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub container: Option<String>,

    #[serde(default, alias = "fields")]
    pub selectors: IndexMap<String, String>,

    #[serde(default)]
    pub pagination: Option<PaginationRule>,
}

impl SiteEntry {
    /// Converts the raw entry, using `fallback_name` when the entry has none
    pub fn into_schema(self, fallback_name: Option<&str>) -> SelectorSchema {
        let name = self
            .name
            .or_else(|| fallback_name.map(str::to_string))
            .unwrap_or_else(|| self.domain.clone());

        SelectorSchema {
            name,
            domain_pattern: self.domain,
            container_selector: self.container.filter(|c| !c.trim().is_empty()),
            fields: self.selectors,
            pagination: self.pagination,
        }
    }
}

/// Splits a field selector into its CSS part and an optional `@attr` suffix
///
/// `"a.title@href"` reads the `href` attribute of the first `a.title`.
/// An `@` inside an attribute selector (`a[title="@home"]`) is not a suffix.
pub fn split_field_selector(spec: &str) -> (&str, Option<&str>) {
    if let Some(pos) = spec.rfind('@') {
        let attr = &spec[pos + 1..];
        let valid = !attr.is_empty()
            && attr
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':');
        if valid {
            return (spec[..pos].trim(), Some(attr));
        }
    }
    (spec.trim(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.crawler.concurrency, 5);
        assert_eq!(config.crawler.rate_limit, 1.0);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.state.enabled);
        assert_eq!(config.identity.rotation, Rotation::RoundRobin);
        assert!(!config.identity.user_agents.is_empty());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str("[crawler]\nconcurrency = 2\n").unwrap();
        assert_eq!(config.crawler.concurrency, 2);
        assert_eq!(config.crawler.request_timeout_secs, 30);
    }

    #[test]
    fn test_pagination_kind_aliases() {
        let rule: PaginationRule =
            serde_json::from_str(r#"{"type": "url_pattern", "template": "/p/{page}"}"#).unwrap();
        assert_eq!(rule.kind, PaginationKind::PageParam);

        let rule: PaginationRule =
            serde_json::from_str(r#"{"type": "NEXT_BUTTON", "selector": "a.next"}"#).unwrap();
        assert_eq!(rule.kind, PaginationKind::NextButton);
    }

    #[test]
    fn test_split_field_selector() {
        assert_eq!(split_field_selector("h2"), ("h2", None));
        assert_eq!(split_field_selector("a.title@href"), ("a.title", Some("href")));
        assert_eq!(
            split_field_selector(r#"a[title="@home"]"#),
            (r#"a[title="@home"]"#, None)
        );
        assert_eq!(split_field_selector("img @data-src"), ("img", Some("data-src")));
    }

    #[test]
    fn test_site_entry_name_fallback() {
        let entry: SiteEntry =
            serde_json::from_str(r#"{"domain": "example.com", "fields": {"t": "h2"}}"#).unwrap();
        let schema = entry.into_schema(None);
        assert_eq!(schema.name, "example.com");
        assert_eq!(schema.fields.get("t").map(String::as_str), Some("h2"));
    }
}
