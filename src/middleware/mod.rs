//! Request/response interceptors wrapped around every fetch
//!
//! A [`MiddlewareChain`] is an ordered list of layers. Requests pass through
//! the layers front to back before the renderer is called; responses pass
//! back to front afterwards. Any layer may turn a response into a retry
//! signal, which short-circuits the remaining layers.
//!
//! The standard chain, as built by [`MiddlewareChain::from_config`]:
//!
//! ```text
//! Headers -> UserAgentRotator -> ProxyRotator -> RateLimiter -> RetryClassifier
//! ```
//!
//! The rate limiter runs right before dispatch, so its token is taken as
//! late as possible. The retry classifier is the innermost layer and sees
//! every response first.

mod headers;
mod proxy;
mod rate_limiter;
mod retry;
mod user_agent;

pub use headers::Headers;
pub use proxy::ProxyRotator;
pub use rate_limiter::RateLimiter;
pub use retry::RetryClassifier;
pub use user_agent::UserAgentRotator;

use crate::config::Config;
use crate::crawler::{FetchError, RenderedPage};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::time::Duration;
use tracing::trace;
use url::Url;

/// What the renderer produced for a request
pub type FetchOutcome = Result<RenderedPage, FetchError>;

/// An outgoing fetch, as mutated by the chain
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    /// Header name -> value; names compare case-insensitively
    pub headers: IndexMap<String, String>,
    /// Proxy URL to route through, if any
    pub proxy: Option<String>,
    pub timeout: Duration,
    /// 1 for the first attempt
    pub attempt: u32,
}

impl FetchRequest {
    pub fn new(url: Url, timeout: Duration, attempt: u32) -> Self {
        Self {
            url,
            headers: IndexMap::new(),
            proxy: None,
            timeout,
            attempt,
        }
    }

    /// Looks a header up case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing any existing value regardless of case
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), value.into());
    }
}

/// Result of passing a response through a layer
#[derive(Debug)]
pub enum Verdict {
    /// Hand the outcome to the next layer (or to the scheduler)
    Continue(FetchOutcome),
    /// Fetch the unit again after `after`
    Retry { after: Duration, reason: FetchError },
}

/// A request/response interceptor
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Mutates an outgoing request
    async fn before_request(&self, request: FetchRequest) -> FetchRequest {
        request
    }

    /// Inspects a response; may turn it into a retry
    async fn after_response(&self, _request: &FetchRequest, outcome: FetchOutcome) -> Verdict {
        Verdict::Continue(outcome)
    }
}

/// One member of the chain
///
/// The member set is fixed per run, so the chain dispatches over a closed
/// enum rather than trait objects.
pub enum Layer {
    Headers(Headers),
    UserAgent(UserAgentRotator),
    Proxy(ProxyRotator),
    RateLimit(RateLimiter),
    Retry(RetryClassifier),
}

impl Layer {
    fn inner(&self) -> &dyn Middleware {
        match self {
            Self::Headers(m) => m,
            Self::UserAgent(m) => m,
            Self::Proxy(m) => m,
            Self::RateLimit(m) => m,
            Self::Retry(m) => m,
        }
    }
}

macro_rules! impl_into_layer {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Layer {
                fn from(m: $ty) -> Self {
                    Layer::$variant(m)
                }
            }
        )*
    };
}

impl_into_layer! {
    Headers => Headers,
    UserAgentRotator => UserAgent,
    ProxyRotator => Proxy,
    RateLimiter => RateLimit,
    RetryClassifier => Retry,
}

/// Ordered interceptor pipeline
#[derive(Default)]
pub struct MiddlewareChain {
    layers: Vec<Layer>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer
    pub fn with(mut self, layer: impl Into<Layer>) -> Self {
        self.layers.push(layer.into());
        self
    }

    /// Builds the standard chain from crawl settings
    ///
    /// The proxy rotator is only added when proxies are configured.
    pub fn from_config(config: &Config) -> Self {
        let identity = &config.identity;
        let mut chain = Self::new()
            .with(Headers::with_extra(&identity.headers))
            .with(UserAgentRotator::new(
                identity.user_agents.clone(),
                identity.rotation,
            ));

        if !identity.proxies.is_empty() {
            chain = chain.with(ProxyRotator::new(identity.proxies.clone()));
        }

        chain
            .with(RateLimiter::per_second(config.crawler.rate_limit))
            .with(RetryClassifier::from_config(&config.retry))
    }

    /// Layer names in order
    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.inner().name()).collect()
    }

    /// Runs a request through every layer, front to back
    pub async fn before_request(&self, mut request: FetchRequest) -> FetchRequest {
        for layer in &self.layers {
            request = layer.inner().before_request(request).await;
        }
        request
    }

    /// Runs a response through every layer, back to front
    ///
    /// Stops at the first layer that asks for a retry.
    pub async fn after_response(&self, request: &FetchRequest, mut outcome: FetchOutcome) -> Verdict {
        for layer in self.layers.iter().rev() {
            match layer.inner().after_response(request, outcome).await {
                Verdict::Continue(next) => outcome = next,
                retry @ Verdict::Retry { .. } => {
                    trace!("{} requested a retry of {}", layer.inner().name(), request.url);
                    return retry;
                }
            }
        }
        Verdict::Continue(outcome)
    }
}
