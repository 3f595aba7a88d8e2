use crate::middleware::{FetchRequest, Middleware};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// Assigns proxies to requests round-robin
pub struct ProxyRotator {
    proxies: Vec<String>,
    next: AtomicUsize,
}

impl ProxyRotator {
    pub fn new(proxies: Vec<String>) -> Self {
        Self {
            proxies,
            next: AtomicUsize::new(0),
        }
    }

    fn pick(&self) -> Option<&str> {
        if self.proxies.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        Some(&self.proxies[index])
    }
}

#[async_trait]
impl Middleware for ProxyRotator {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn before_request(&self, mut request: FetchRequest) -> FetchRequest {
        if let Some(proxy) = self.pick() {
            trace!("Routing {} through {}", request.url, proxy);
            request.proxy = Some(proxy.to_string());
        }
        request
    }
}
