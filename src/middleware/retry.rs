use crate::config::RetryConfig;
use crate::middleware::{FetchOutcome, FetchRequest, Middleware, Verdict};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Turns transient failures into retry signals
///
/// Timeouts, network failures, 429 and 5xx are retried with exponential
/// backoff until the unit has used `max_attempts` fetches; after that, and
/// for every permanent failure, the error propagates unchanged.
pub struct RetryClassifier {
    max_attempts: u32,
    base: Duration,
    max: Duration,
}

impl RetryClassifier {
    pub fn new(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the attempt following `attempt` (1-based)
    ///
    /// `base * 2^(attempt - 1)`, capped at the configured maximum.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

#[async_trait]
impl Middleware for RetryClassifier {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn after_response(&self, request: &FetchRequest, outcome: FetchOutcome) -> Verdict {
        match outcome {
            Err(e) if e.is_transient() && request.attempt < self.max_attempts => {
                let after = self.backoff(request.attempt);
                debug!(
                    "Transient failure on {} (attempt {}/{}): {}; retrying in {:?}",
                    request.url, request.attempt, self.max_attempts, e, after
                );
                Verdict::Retry { after, reason: e }
            }
            other => Verdict::Continue(other),
        }
    }
}
