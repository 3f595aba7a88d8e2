//! Page rendering
//!
//! A [`Renderer`] loads one URL and hands back the raw HTML. The crawler
//! only ever talks to this trait, so tests can script pages without a
//! network, and a browser-backed renderer could replace [`HttpRenderer`]
//! without touching the scheduler.

use crate::middleware::FetchRequest;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, Proxy};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;
use url::Url;

/// A fetched page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: u16,
    /// Page body
    pub html: String,
}

/// Why a fetch failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("network failure: {0}")]
    Network(String),

    #[error("empty response body")]
    EmptyBody,

    #[error("unsupported content type '{0}'")]
    UnsupportedContent(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Returns true for conditions worth retrying
    ///
    /// | Condition | Transient |
    /// |-----------|-----------|
    /// | Timeout | yes |
    /// | HTTP 429 | yes |
    /// | HTTP 5xx | yes |
    /// | Network failure | yes |
    /// | Other HTTP status (404, 403, ...) | no |
    /// | Empty body / non-HTML content | no |
    /// | Invalid request | no |
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) => true,
            Self::HttpStatus(code) => *code == 429 || (500..600).contains(code),
            Self::EmptyBody | Self::UnsupportedContent(_) | Self::InvalidRequest(_) => false,
        }
    }
}

/// Loads pages
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Fetches the request's URL
    ///
    /// Implementations honour `request.headers`, `request.proxy` and
    /// `request.timeout`.
    async fn fetch(&self, request: &FetchRequest) -> Result<RenderedPage, FetchError>;
}

/// reqwest-backed renderer
///
/// Keeps one client per configured proxy plus one direct client, so
/// connection pools are reused across requests.
pub struct HttpRenderer {
    direct: Client,
    proxied: HashMap<String, Client>,
}

impl HttpRenderer {
    /// Builds the HTTP clients
    ///
    /// # Arguments
    ///
    /// * `proxies` - Proxy URLs the proxy rotator may assign
    ///
    /// # Returns
    ///
    /// * `Ok(HttpRenderer)` - Successfully built clients
    /// * `Err(reqwest::Error)` - A client or proxy could not be built
    pub fn new(proxies: &[String]) -> Result<Self, reqwest::Error> {
        let direct = build_http_client(None)?;

        let mut proxied = HashMap::new();
        for proxy in proxies {
            let client = build_http_client(Some(Proxy::all(proxy.as_str())?))?;
            proxied.insert(proxy.clone(), client);
        }

        Ok(Self { direct, proxied })
    }

    fn client_for(&self, proxy: Option<&str>) -> &Client {
        proxy
            .and_then(|p| self.proxied.get(p))
            .unwrap_or(&self.direct)
    }
}

/// Builds an HTTP client
///
/// Identity headers are not set here; the middleware chain sets them per
/// request.
pub fn build_http_client(proxy: Option<Proxy>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(proxy);
    }

    builder.build()
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn fetch(&self, request: &FetchRequest) -> Result<RenderedPage, FetchError> {
        let client = self.client_for(request.proxy.as_deref());

        let mut builder = client
            .get(request.url.clone())
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;

        let status = response.status();
        let final_url = response.url().clone();
        trace!("{} -> {} ({})", request.url, final_url, status);

        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if !is_markup(&content_type) {
            return Err(FetchError::UnsupportedContent(content_type));
        }

        let html = response.text().await.map_err(classify_reqwest_error)?;
        if html.trim().is_empty() {
            return Err(FetchError::EmptyBody);
        }

        Ok(RenderedPage {
            final_url,
            status: status.as_u16(),
            html,
        })
    }
}

/// Missing content types are given the benefit of the doubt
fn is_markup(content_type: &str) -> bool {
    content_type.is_empty()
        || content_type.contains("html")
        || content_type.contains("xml")
        || content_type.starts_with("text/")
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_builder() {
        FetchError::InvalidRequest(e.to_string())
    } else if let Some(status) = e.status() {
        FetchError::HttpStatus(status.as_u16())
    } else {
        FetchError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::Network("reset".into()).is_transient());
        assert!(FetchError::HttpStatus(429).is_transient());
        assert!(FetchError::HttpStatus(500).is_transient());
        assert!(FetchError::HttpStatus(503).is_transient());
        assert!(FetchError::HttpStatus(599).is_transient());
    }

    #[test]
    fn test_permanent_classification() {
        assert!(!FetchError::HttpStatus(404).is_transient());
        assert!(!FetchError::HttpStatus(403).is_transient());
        assert!(!FetchError::HttpStatus(410).is_transient());
        assert!(!FetchError::EmptyBody.is_transient());
        assert!(!FetchError::UnsupportedContent("image/png".into()).is_transient());
    }

    #[test]
    fn test_is_markup() {
        assert!(is_markup("text/html; charset=utf-8"));
        assert!(is_markup("application/xhtml+xml"));
        assert!(is_markup(""));
        assert!(!is_markup("application/pdf"));
        assert!(!is_markup("image/png"));
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(None).is_ok());
    }

    #[test]
    fn test_renderer_with_proxies() {
        let renderer = HttpRenderer::new(&["http://127.0.0.1:3128".to_string()]).unwrap();
        assert!(renderer.proxied.contains_key("http://127.0.0.1:3128"));
        assert!(std::ptr::eq(
            renderer.client_for(Some("http://unknown:1")),
            &renderer.direct
        ));
    }
}
