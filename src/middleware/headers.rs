use crate::middleware::{FetchRequest, Middleware};
use async_trait::async_trait;
use indexmap::IndexMap;

/// Browser-like headers sent with every request
const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Upgrade-Insecure-Requests", "1"),
];

/// Fills in default and configured headers the request does not set yet
pub struct Headers {
    headers: IndexMap<String, String>,
}

impl Headers {
    /// Defaults only
    pub fn new() -> Self {
        Self::with_extra(&IndexMap::new())
    }

    /// Defaults plus `extra`; `extra` wins on name clashes
    pub fn with_extra(extra: &IndexMap<String, String>) -> Self {
        let mut headers: IndexMap<String, String> = DEFAULT_HEADERS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        for (name, value) in extra {
            headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
            headers.insert(name.clone(), value.clone());
        }

        Self { headers }
    }
}

impl Default for Headers {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for Headers {
    fn name(&self) -> &'static str {
        "headers"
    }

    async fn before_request(&self, mut request: FetchRequest) -> FetchRequest {
        for (name, value) in &self.headers {
            if request.header(name).is_none() {
                request.set_header(name, value.clone());
            }
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use url::Url;

    fn request() -> FetchRequest {
        FetchRequest::new(
            Url::parse("https://example.com/").unwrap(),
            Duration::from_secs(5),
            1,
        )
    }

    #[tokio::test]
    async fn test_adds_defaults() {
        let req = Headers::new().before_request(request()).await;
        assert!(req.header("Accept").unwrap().contains("text/html"));
        assert_eq!(req.header("accept-language"), Some("en-US,en;q=0.9"));
    }

    #[tokio::test]
    async fn test_does_not_override_existing() {
        let mut req = request();
        req.set_header("accept", "application/json");

        let req = Headers::new().before_request(req).await;
        assert_eq!(req.header("Accept"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_extra_headers_replace_defaults() {
        let extra = IndexMap::from([
            ("accept-language".to_string(), "de-DE".to_string()),
            ("X-Team".to_string(), "data".to_string()),
        ]);
        let req = Headers::with_extra(&extra).before_request(request()).await;
        assert_eq!(req.header("Accept-Language"), Some("de-DE"));
        assert_eq!(req.header("x-team"), Some("data"));
    }
}
