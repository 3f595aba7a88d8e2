use crate::middleware::{FetchRequest, Middleware};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Global request pacing shared by every worker
///
/// Each request reserves the next free slot on a single timeline, with
/// slots `1 / rate` apart, then sleeps until its slot. Concurrency cannot
/// defeat the limit because all workers draw from the same timeline.
pub struct RateLimiter {
    interval: Option<Duration>,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// A limiter allowing `rate` requests per second; 0 disables it
    pub fn per_second(rate: f64) -> Self {
        let interval = if rate > 0.0 && rate.is_finite() {
            Some(Duration::from_secs_f64(1.0 / rate))
        } else {
            None
        };
        Self::with_interval(interval)
    }

    /// A limiter with an explicit minimum spacing between requests
    pub fn with_interval(interval: Option<Duration>) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Reserves the next slot and returns the instant it starts
    fn reserve(&self, interval: Duration) -> Instant {
        let now = Instant::now();
        let mut next = self
            .next_slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let slot = match *next {
            Some(at) if at > now => at,
            _ => now,
        };
        *next = Some(slot + interval);
        slot
    }

    /// Waits until the caller may dispatch
    pub async fn acquire(&self) {
        let interval = match self.interval {
            Some(interval) => interval,
            None => return,
        };

        let slot = self.reserve(interval);
        if slot > Instant::now() {
            trace!("Rate limiter delaying dispatch by {:?}", slot - Instant::now());
            tokio::time::sleep_until(slot).await;
        }
    }
}

#[async_trait]
impl Middleware for RateLimiter {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    async fn before_request(&self, request: FetchRequest) -> FetchRequest {
        self.acquire().await;
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_zero_rate_is_unlimited() {
        assert!(RateLimiter::per_second(0.0).interval().is_none());
        assert_eq!(
            RateLimiter::per_second(4.0).interval(),
            Some(Duration::from_millis(250))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaces_sequential_requests() {
        let limiter = RateLimiter::per_second(2.0);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        // First slot is immediate, then 500ms apart
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_workers_share_one_timeline() {
        let limiter = Arc::new(RateLimiter::per_second(5.0));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap() - start);
        }
        times.sort();

        // 10 requests at 5/s need 9 intervals of 200ms
        assert_eq!(*times.last().unwrap(), Duration::from_millis(1800));

        // No 1-second window holds more than ceil(rate) + 1 dispatches
        for (i, t) in times.iter().enumerate() {
            let in_window = times[i..]
                .iter()
                .filter(|other| **other < *t + Duration::from_secs(1))
                .count();
            assert!(in_window <= 6, "window starting at {:?} has {}", t, in_window);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_limiter_does_not_bank_slots() {
        let limiter = RateLimiter::per_second(1.0);
        limiter.acquire().await;

        tokio::time::sleep(Duration::from_secs(10)).await;

        let before = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::from_secs(1));
    }
}
