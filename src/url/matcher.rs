/// Checks if a schema's domain pattern applies to a host
///
/// Selector schemas are matched to a run by domain substring, so a schema
/// declared for `books.toscrape.com` applies to that host and a schema
/// declared for `toscrape` applies to every host containing it. A leading
/// `www.` on either side is ignored. Patterns starting with `*.` match the
/// bare domain and any subdomain, but nothing else.
///
/// Both arguments are compared case-insensitively.
///
/// # Examples
///
/// ```
/// use trawl::url::matches_domain;
///
/// assert!(matches_domain("example.com", "www.example.com"));
/// assert!(matches_domain("*.example.com", "shop.example.com"));
/// assert!(!matches_domain("*.example.com", "myexample.com"));
/// assert!(!matches_domain("", "example.com"));
/// ```
pub fn matches_domain(pattern: &str, host: &str) -> bool {
    let pattern = strip_www(pattern.trim()).to_lowercase();
    let host = strip_www(host.trim()).to_lowercase();

    if pattern.is_empty() || host.is_empty() {
        return false;
    }

    if let Some(base) = pattern.strip_prefix("*.") {
        host == base || host.ends_with(&format!(".{}", base))
    } else {
        host.contains(&pattern)
    }
}

fn strip_www(value: &str) -> &str {
    value.strip_prefix("www.").unwrap_or(value)
}
