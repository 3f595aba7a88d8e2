use url::Url;

/// Extracts the lowercase host from a URL
///
/// Returns `None` if the URL has no host.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use trawl::url::extract_domain;
///
/// let url = Url::parse("https://Shop.Example.com/list?page=2").unwrap();
/// assert_eq!(extract_domain(&url), Some("shop.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
