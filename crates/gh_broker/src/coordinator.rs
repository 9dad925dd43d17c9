use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::metrics;
use crate::model::RateLimitUpdate;

/// Remaining-request floor below which callers wait for the reset.
pub const DEFAULT_THRESHOLD: i64 = 10;
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(2000);

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How long to wait before the next request, if at all.
///
/// Plenty of budget left, or a reset time already in the past, means no wait.
pub fn wait_for(
    update: &RateLimitUpdate,
    threshold: i64,
    now: DateTime<Utc>,
    jitter: Duration,
) -> Option<Duration> {
    if update.remaining > threshold {
        return None;
    }
    let until_reset = (update.reset - now).to_std().ok()?;
    if until_reset.is_zero() {
        return None;
    }
    Some(until_reset + jitter)
}

pub struct RateLimitCoordinator {
    threshold: i64,
    max_jitter: Duration,
    sleeper: Box<dyn Sleeper>,
}

impl Default for RateLimitCoordinator {
    fn default() -> Self {
        Self::new(Box::new(TokioSleeper))
    }
}

impl RateLimitCoordinator {
    pub fn new(sleeper: Box<dyn Sleeper>) -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_jitter: DEFAULT_MAX_JITTER,
            sleeper,
        }
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.threshold = threshold;
        self
    }

    fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(fastrand::u64(0..=max))
    }

    /// Records the latest numbers and sleeps through the reset when the budget is nearly gone.
    pub async fn observe(&self, update: &RateLimitUpdate) -> Option<Duration> {
        metrics::RATE_LIMIT.set(update.limit);
        metrics::RATE_REMAINING.set(update.remaining);

        let wait = wait_for(update, self.threshold, Utc::now(), self.jitter());
        match wait {
            Some(wait) => {
                info!(
                    remaining = update.remaining,
                    reset_at = %update.reset,
                    wait_ms = wait.as_millis() as u64,
                    "rate limit nearly exhausted, sleeping until reset"
                );
                metrics::SLEEP_SECONDS.inc_by(wait.as_secs());
                self.sleeper.sleep(wait).await;
            }
            None => debug!(remaining = update.remaining, "rate limit ok"),
        }
        wait
    }
}
