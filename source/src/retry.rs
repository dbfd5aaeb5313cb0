//! Retry policy with bounded exponential backoff.
//!
//! # Policy
//!
//! - `max_attempts` total attempts per page, first attempt included
//! - Backoff before retry `n` (0-based): `min(base_delay * 2^n, max_delay)`
//! - Jitter: up-jitter by a random fraction in `[0, jitter_factor]` of the backoff
//! - `Retry-After` / `Retry-After-Ms` on a retryable response replaces the
//!   computed delay, capped at `max_delay`
//!
//! # Retryable Conditions
//!
//! - Timeouts and connection/transport errors
//! - HTTP 408, 429, 5xx
//!
//! Anything else abandons the page immediately.

use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::AttemptError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per page, including the first one.
    pub max_attempts: u32,
    /// Backoff before the first retry.
    pub base_delay: Duration,
    /// Upper bound for the un-jittered backoff.
    pub max_delay: Duration,
    /// Up-jitter factor (0.5 = up to 50% added on top of the backoff).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            jitter_factor: 0.5,
        }
    }
}

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Succeed,
    RetryAfter(Duration),
    Abandon,
}

impl RetryPolicy {
    /// Decide the next step after attempt number `attempt` (0-based).
    #[must_use]
    pub fn decide<T>(&self, outcome: &Result<T, AttemptError>, attempt: u32) -> RetryDecision {
        match outcome {
            Ok(_) => RetryDecision::Succeed,
            Err(err) if !err.is_retryable() => RetryDecision::Abandon,
            Err(_) if attempt.saturating_add(1) >= self.max_attempts => RetryDecision::Abandon,
            Err(err) => RetryDecision::RetryAfter(self.delay(attempt, err.retry_after())),
        }
    }

    /// Un-jittered backoff before retry number `attempt`.
    ///
    /// Non-decreasing in `attempt` and never above `max_delay`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff plus jitter, or the server's `Retry-After` when present.
    #[must_use]
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(delay) = retry_after {
            return delay.min(self.max_delay);
        }
        let backoff = self.backoff(attempt);
        if self.jitter_factor <= 0.0 {
            return backoff;
        }
        let jitter = rand::random::<f64>() * self.jitter_factor;
        backoff + backoff.mul_f64(jitter)
    }
}

/// Parse `Retry-After` or `Retry-After-Ms` headers.
///
/// Returns `None` if headers are missing, invalid, or zero. HTTP-date values
/// are not supported and are treated as missing.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    // Try Retry-After-Ms first (milliseconds, float)
    if let Some(val) = headers.get("retry-after-ms")
        && let Ok(s) = val.to_str()
        && let Ok(ms) = s.trim().parse::<f64>()
        && ms.is_finite()
        && ms > 0.0
    {
        return Some(Duration::from_secs_f64(ms / 1000.0));
    }

    // Try Retry-After (seconds, integer)
    if let Some(val) = headers.get("retry-after")
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
        && secs > 0
    {
        return Some(Duration::from_secs(secs));
    }

    None
}
