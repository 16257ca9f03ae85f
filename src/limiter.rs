//! Admission control for outbound requests.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use tokio::{
    sync::Mutex,
    time::{sleep, Instant},
};

use crate::{CancelSignal, Result, SnipeItError};

const DEFAULT_REQUESTS_PER_SECOND: f64 = 10.0;
const DEFAULT_BURST: i64 = 15;

/// Limits the rate at which requests are sent.
#[async_trait]
pub trait RateLimiter: Send + Sync + fmt::Debug {
    /// Waits until a request may be sent, or until `cancel` fires.
    ///
    /// Returns [`SnipeItError::Cancelled`] if the signal wins.
    async fn wait(&self, cancel: &CancelSignal) -> Result<()>;
}

/// A limiter that admits every request immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn wait(&self, _cancel: &CancelSignal) -> Result<()> {
        Ok(())
    }
}

/// Token bucket limiter with a sustained rate and a burst allowance.
///
/// The bucket starts full. The internal lock is held for the full duration
/// of [`RateLimiter::wait`], including the sleep for the next token, so
/// concurrent waiters are admitted strictly one at a time in arrival order.
/// Throughput under contention is therefore capped at one admission per
/// token interval regardless of how many tasks are waiting.
///
/// The refill clock is advanced before a caller sleeps for a token, not
/// after. The time spent sleeping is credited again on the next call, so a
/// caller arriving right after a waited admission may be admitted at once.
pub struct TokenBucketRateLimiter {
    state: Mutex<BucketState>,
    max_tokens: f64,
    refill_rate_per_sec: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl fmt::Debug for TokenBucketRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucketRateLimiter")
            .field("max_tokens", &self.max_tokens)
            .field("refill_rate_per_sec", &self.refill_rate_per_sec)
            .finish_non_exhaustive()
    }
}

impl Default for TokenBucketRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_REQUESTS_PER_SECOND, DEFAULT_BURST)
    }
}

impl TokenBucketRateLimiter {
    /// Creates a limiter admitting `requests_per_second` on average and up to
    /// `burst` requests back to back.
    ///
    /// Non-positive (or non-finite) values fall back to 10 req/s and a burst
    /// of 15.
    pub fn new(requests_per_second: f64, burst: i64) -> Self {
        let refill_rate_per_sec = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            requests_per_second
        } else {
            DEFAULT_REQUESTS_PER_SECOND
        };
        let burst = if burst > 0 { burst } else { DEFAULT_BURST };
        let max_tokens = burst as f64;

        Self {
            state: Mutex::new(BucketState {
                tokens: max_tokens,
                last_refill: Instant::now(),
            }),
            max_tokens,
            refill_rate_per_sec,
        }
    }

    pub fn requests_per_second(&self) -> f64 {
        self.refill_rate_per_sec
    }

    pub fn burst(&self) -> f64 {
        self.max_tokens
    }
}

#[async_trait]
impl RateLimiter for TokenBucketRateLimiter {
    async fn wait(&self, cancel: &CancelSignal) -> Result<()> {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = self
            .max_tokens
            .min(state.tokens + elapsed * self.refill_rate_per_sec);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }

        // A tiny rate can push the wait past what `Duration` represents.
        let wait = Duration::try_from_secs_f64((1.0 - state.tokens) / self.refill_rate_per_sec)
            .unwrap_or(Duration::MAX);

        #[cfg(feature = "tracing")]
        tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiter waiting for token");

        tokio::select! {
            _ = sleep(wait) => {
                state.tokens = 0.0;
                Ok(())
            }
            reason = cancel.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%reason, "rate limiter wait cancelled");

                Err(SnipeItError::Cancelled(reason))
            }
        }
    }
}
