//! Backoff policies.

use crate::response::Response;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use reqwest::header::RETRY_AFTER;
use std::fmt;
use std::time::Duration;

/// Computes how long to wait before the next attempt.
///
/// `attempt` is the index of the attempt that just failed, starting at `0`.
pub trait BackoffPolicy: Send + Sync {
    /// Wait duration before attempt `attempt + 1`.
    fn backoff(
        &self,
        min: Duration,
        max: Duration,
        attempt: u32,
        response: Option<&Response>,
    ) -> Duration;
}

impl<F> BackoffPolicy for F
where
    F: Fn(Duration, Duration, u32, Option<&Response>) -> Duration + Send + Sync,
{
    fn backoff(
        &self,
        min: Duration,
        max: Duration,
        attempt: u32,
        response: Option<&Response>,
    ) -> Duration {
        self(min, max, attempt, response)
    }
}

/// `min * 2^attempt`, capped at `max`.
///
/// Overflow of the exponentiation is clamped to `max`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialBackoff;

impl ExponentialBackoff {
    /// Create an exponential backoff.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Calculate the delay for an attempt.
    pub fn calculate_delay(min: Duration, max: Duration, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| min.checked_mul(factor))
            .map_or(max, |delay| delay.min(max))
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn backoff(
        &self,
        min: Duration,
        max: Duration,
        attempt: u32,
        _response: Option<&Response>,
    ) -> Duration {
        Self::calculate_delay(min, max, attempt)
    }
}

/// Linear backoff with jitter.
///
/// `min` and `max` bound the jitter, not the result: a base is picked at
/// random in `[min, max)` and multiplied by `attempt + 1`. Setting both to
/// one second gives strictly linear waits of 1s, 2s, 3s...; a wide spread
/// such as 100ms..20s gives heavy jitter.
pub struct LinearJitterBackoff {
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl LinearJitterBackoff {
    /// Create a linear jitter backoff seeded from system entropy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a linear jitter backoff drawing from `rng`.
    #[must_use]
    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// Calculate the delay for an attempt using `rng` for the jitter.
    pub fn calculate_delay(
        rng: &mut dyn RngCore,
        min: Duration,
        max: Duration,
        attempt: u32,
    ) -> Duration {
        let multiplier = attempt.saturating_add(1);

        if max <= min {
            return min.checked_mul(multiplier).unwrap_or(Duration::MAX);
        }

        let spread = (max - min).as_nanos().min(u64::MAX as u128) as u64;
        let jitter = Duration::from_nanos(rng.gen_range(0..spread));
        (min + jitter)
            .checked_mul(multiplier)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for LinearJitterBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LinearJitterBackoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearJitterBackoff").finish_non_exhaustive()
    }
}

impl BackoffPolicy for LinearJitterBackoff {
    fn backoff(
        &self,
        min: Duration,
        max: Duration,
        attempt: u32,
        _response: Option<&Response>,
    ) -> Duration {
        let mut rng = self.rng.lock();
        Self::calculate_delay(&mut **rng, min, max, attempt)
    }
}

/// Honors a `Retry-After` header on `429` and `503` responses.
///
/// Only the delay-seconds form is understood. The hinted wait is capped at
/// `max`; without a usable hint the wrapped policy decides.
#[derive(Debug, Clone, Default)]
pub struct RetryAfterBackoff<B> {
    fallback: B,
}

impl<B: BackoffPolicy> RetryAfterBackoff<B> {
    /// Wrap `fallback`.
    pub fn new(fallback: B) -> Self {
        Self { fallback }
    }
}

impl<B: BackoffPolicy> BackoffPolicy for RetryAfterBackoff<B> {
    fn backoff(
        &self,
        min: Duration,
        max: Duration,
        attempt: u32,
        response: Option<&Response>,
    ) -> Duration {
        match response.and_then(parse_retry_after) {
            Some(hint) => hint.min(max),
            None => self.fallback.backoff(min, max, attempt, response),
        }
    }
}

/// Parse a `Retry-After: <seconds>` header from a rate limited response.
fn parse_retry_after(response: &Response) -> Option<Duration> {
    if !matches!(response.status(), 429 | 503) {
        return None;
    }
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
