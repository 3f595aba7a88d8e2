use crate::config::Rotation;
use crate::middleware::{FetchRequest, Middleware};
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// Sets the `User-Agent` of every request from a pool
pub struct UserAgentRotator {
    pool: Vec<String>,
    rotation: Rotation,
    next: AtomicUsize,
}

impl UserAgentRotator {
    pub fn new(pool: Vec<String>, rotation: Rotation) -> Self {
        Self {
            pool,
            rotation,
            next: AtomicUsize::new(0),
        }
    }

    /// Picks the user agent for the next request
    pub fn pick(&self) -> Option<&str> {
        if self.pool.is_empty() {
            return None;
        }

        let index = match self.rotation {
            Rotation::RoundRobin => self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len(),
            Rotation::Random => rand::rng().random_range(0..self.pool.len()),
        };
        Some(&self.pool[index])
    }
}

#[async_trait]
impl Middleware for UserAgentRotator {
    fn name(&self) -> &'static str {
        "user-agent"
    }

    async fn before_request(&self, mut request: FetchRequest) -> FetchRequest {
        if let Some(agent) = self.pick() {
            trace!("User-Agent for {}: {}", request.url, agent);
            request.set_header("User-Agent", agent);
        }
        request
    }
}
