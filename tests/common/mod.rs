//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trawl::config::Config;
use trawl::crawler::{CrawlOptions, FetchError, RenderedPage, Renderer};
use trawl::middleware::FetchRequest;
use url::Url;
use wiremock::ResponseTemplate;

/// A listing page with `n` `.item` entries and an optional next link
pub fn listing(n: usize, next: Option<&str>) -> String {
    page_listing(1, n, next)
}

/// Listing page number `page`; items on different pages never repeat
pub fn page_listing(page: usize, n: usize, next: Option<&str>) -> String {
    let mut html = String::from("<html><head><title>Listing</title></head><body><ul>");
    for i in 0..n {
        html.push_str(&format!(
            r#"<li class="item"><h2>Book {}</h2><span class="price">£{}.99</span></li>"#,
            (page - 1) * 100 + i + 1,
            10 + i
        ));
    }
    html.push_str("</ul>");
    if let Some(href) = next {
        html.push_str(&format!(r#"<a class="next" href="{}">next</a>"#, href));
    }
    html.push_str("</body></html>");
    html
}

/// A page of `n` product cards with no declared structure
pub fn cards(n: usize) -> String {
    let mut html = String::from("<html><body><header><h1>Shop</h1></header><main>");
    for i in 0..n {
        html.push_str(&format!(
            r#"<div class="card"><h3>Product {}</h3><span>${}</span></div>"#,
            i + 1,
            (i + 1) * 5
        ));
    }
    html.push_str("</main></body></html>");
    html
}

/// A 200 response carrying `body` as HTML
pub fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

/// Settings with no rate limit and millisecond retry backoff
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.crawler.rate_limit = 0.0;
    config.retry.max_attempts = 3;
    config.retry.backoff_base_ms = 10;
    config.retry.backoff_max_ms = 50;
    config
}

pub fn options(concurrency: usize) -> CrawlOptions {
    CrawlOptions {
        concurrency,
        request_timeout: Duration::from_secs(5),
        drain_timeout: Duration::from_secs(5),
        ..CrawlOptions::default()
    }
}

/// In-process renderer serving fixed pages by path
///
/// Records how many fetches overlap and when each one started.
pub struct ScriptedRenderer {
    pages: HashMap<String, String>,
    latency: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<tokio::time::Instant>>,
    fetched: Mutex<Vec<String>>,
    cancel_after: Mutex<Option<(String, CancellationToken)>>,
}

impl ScriptedRenderer {
    pub fn new(latency: Duration) -> Self {
        Self {
            pages: HashMap::new(),
            latency,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
            cancel_after: Mutex::new(None),
        }
    }

    pub fn page(mut self, path: &str, body: String) -> Self {
        self.pages.insert(path.to_string(), body);
        self
    }

    /// Most fetches ever in progress at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    /// Cancels `token` as soon as `path` has been served
    pub fn cancel_after(&self, path: &str, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((path.to_string(), token));
    }

    /// Paths fetched, in call order
    pub fn fetched_paths(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    /// Start instants of every fetch, in call order
    pub fn start_times(&self) -> Vec<tokio::time::Instant> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn fetch(&self, request: &FetchRequest) -> Result<RenderedPage, FetchError> {
        self.started.lock().unwrap().push(tokio::time::Instant::now());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        let path = request.url.path().to_string();
        self.fetched.lock().unwrap().push(path.clone());
        if let Some((after, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if *after == path {
                token.cancel();
            }
        }

        match self.pages.get(request.url.path()) {
            Some(body) => Ok(RenderedPage {
                final_url: request.url.clone(),
                status: 200,
                html: body.clone(),
            }),
            None => Err(FetchError::HttpStatus(404)),
        }
    }
}

/// Seed URLs on a host no test ever resolves
pub fn scripted_url(path: &str) -> String {
    Url::parse("https://shop.test/")
        .and_then(|base| base.join(path))
        .map(|url| url.to_string())
        .unwrap()
}
